//! Store reachability signal for the ops layer.

use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{error, info};

use crate::error::StoreError;

/// Point-in-time health view, served by `/health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// Counts consecutive store outages. Any successful store operation resets
/// the count.
#[derive(Debug)]
pub struct HealthMonitor {
    unhealthy_after: u32,
    consecutive: AtomicU32,
    last_error: Mutex<Option<String>>,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(unhealthy_after: u32) -> Self {
        Self {
            unhealthy_after: unhealthy_after.max(1),
            consecutive: AtomicU32::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn record_success(&self) {
        let previous = self.consecutive.swap(0, Ordering::SeqCst);
        if previous >= self.unhealthy_after {
            info!(failures = previous, "Store reachable again");
        }
    }

    /// Count an outage. Request-level rejections are not outages and leave
    /// the counter alone.
    pub fn record_failure(&self, err: &StoreError) {
        if !err.is_outage() {
            return;
        }
        let count = self.consecutive.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
        if count == self.unhealthy_after {
            error!(failures = count, error = %err, "Store marked unhealthy");
        }
    }

    /// Feed a store result into the counter.
    pub fn observe<T>(&self, result: &Result<T, StoreError>) {
        match result {
            Ok(_) => self.record_success(),
            Err(e) => self.record_failure(e),
        }
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.consecutive.load(Ordering::SeqCst) < self.unhealthy_after
    }

    #[must_use]
    pub fn report(&self) -> HealthReport {
        let consecutive_failures = self.consecutive.load(Ordering::SeqCst);
        HealthReport {
            healthy: consecutive_failures < self.unhealthy_after,
            consecutive_failures,
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(3)
    }
}

//! Persistence collaborators.
//!
//! The relational engine is external; the core only talks to it through the
//! traits below. [`MemoryStore`] implements all of them for single-process
//! deployments and tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::StoreResult;
use crate::model::{
    Activity, AgentId, AgentRecord, Alert, AlertId, AlertStatus, Category, ExecutionRecord,
    FeedbackEvent,
};

pub use memory::MemoryStore;

/// Filter for [`AlertStore::list_recent`]. `None` fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertFilter {
    pub agent_id: Option<AgentId>,
    pub category: Option<Category>,
    pub status: Option<AlertStatus>,
    /// Only alerts created at or after this instant
    pub since: Option<DateTime<Utc>>,
}

impl AlertFilter {
    #[must_use]
    pub fn matches(&self, alert: &Alert) -> bool {
        self.agent_id.as_ref().is_none_or(|id| *id == alert.agent_id)
            && self.category.is_none_or(|c| c == alert.category)
            && self.status.is_none_or(|s| s == alert.status)
            && self.since.is_none_or(|t| alert.created_at >= t)
    }
}

/// Durable alert collection.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create(&self, alert: Alert) -> StoreResult<AlertId>;

    async fn get(&self, id: &AlertId) -> StoreResult<Option<Alert>>;

    /// Newest first, at most `limit` rows.
    async fn list_recent(&self, filter: &AlertFilter, limit: usize) -> StoreResult<Vec<Alert>>;

    /// Apply a forward-only status change.
    async fn update_status(&self, id: &AlertId, status: AlertStatus) -> StoreResult<Alert>;
}

/// Agent records with atomic read-modify-write updates.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn list_agents(&self) -> StoreResult<Vec<AgentRecord>>;

    async fn get_agent(&self, id: &AgentId) -> StoreResult<Option<AgentRecord>>;

    /// Insert the record unless one with the same id exists. Returns the
    /// stored record.
    async fn ensure_agent(&self, record: AgentRecord) -> StoreResult<AgentRecord>;

    /// Increment run counters.
    async fn record_run(
        &self,
        id: &AgentId,
        alerts_generated: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<AgentRecord>;

    /// Replace the accuracy score (last write wins).
    async fn update_accuracy(
        &self,
        id: &AgentId,
        accuracy: f64,
        samples: usize,
        min_samples: usize,
    ) -> StoreResult<AgentRecord>;

    async fn record_successful_prediction(&self, id: &AgentId) -> StoreResult<AgentRecord>;
}

/// Append-only execution history.
#[async_trait]
pub trait ExecutionLog: Send + Sync {
    async fn append(&self, record: ExecutionRecord) -> StoreResult<()>;

    /// Newest first.
    async fn list_for_agent(&self, id: &AgentId, limit: usize)
        -> StoreResult<Vec<ExecutionRecord>>;
}

/// Append-only feedback events.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn append(&self, event: FeedbackEvent) -> StoreResult<()>;

    async fn list_since(
        &self,
        agent_id: &AgentId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<FeedbackEvent>>;
}

/// Append-only audit trail.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn append(&self, activity: Activity) -> StoreResult<()>;
}

/// The four collections plus the audit trail, shared by the core components.
#[derive(Clone)]
pub struct Stores {
    pub alerts: Arc<dyn AlertStore>,
    pub agents: Arc<dyn AgentStore>,
    pub executions: Arc<dyn ExecutionLog>,
    pub feedback: Arc<dyn FeedbackStore>,
    pub activity: Arc<dyn ActivityLog>,
}

impl Stores {
    /// Back every collection with the same in-memory store.
    #[must_use]
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            alerts: store.clone(),
            agents: store.clone(),
            executions: store.clone(),
            feedback: store.clone(),
            activity: store,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }
}

//! Execution records and the activity audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::agent::AgentId;
use super::alert::AlertId;

/// Final outcome of one runner invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed,
    Failed,
    TimedOut,
}

impl ExecutionOutcome {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, ExecutionOutcome::Completed)
    }
}

/// Audit entry for one runner invocation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub agent_id: AgentId,
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: ExecutionOutcome,
    pub attempts: u32,
    pub alerts_emitted: usize,
    pub alerts_suppressed: usize,
    pub last_error: Option<String>,
}

impl ExecutionRecord {
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// An execution still in flight. Consumed by [`PendingExecution::finalize`].
#[derive(Debug, Clone)]
pub struct PendingExecution {
    id: Uuid,
    agent_id: AgentId,
    cycle_id: Uuid,
    started_at: DateTime<Utc>,
    attempts: u32,
    alerts_emitted: usize,
    alerts_suppressed: usize,
    last_error: Option<String>,
}

impl PendingExecution {
    #[must_use]
    pub fn start(agent_id: AgentId, cycle_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            cycle_id,
            started_at: Utc::now(),
            attempts: 0,
            alerts_emitted: 0,
            alerts_suppressed: 0,
            last_error: None,
        }
    }

    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub fn record_emitted(&mut self) {
        self.alerts_emitted += 1;
    }

    pub fn record_suppressed(&mut self) {
        self.alerts_suppressed += 1;
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub const fn alerts_emitted(&self) -> usize {
        self.alerts_emitted
    }

    #[must_use]
    pub fn finalize(self, outcome: ExecutionOutcome) -> ExecutionRecord {
        ExecutionRecord {
            id: self.id,
            agent_id: self.agent_id,
            cycle_id: self.cycle_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            outcome,
            attempts: self.attempts,
            alerts_emitted: self.alerts_emitted,
            alerts_suppressed: self.alerts_suppressed,
            last_error: self.last_error,
        }
    }
}

/// Kind of audit trail entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    AlertCreated,
    AlertStatusChanged,
    FeedbackRecorded,
}

/// Audit trail entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub kind: ActivityKind,
    pub agent_id: AgentId,
    pub alert_id: Option<AlertId>,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        kind: ActivityKind,
        agent_id: AgentId,
        alert_id: Option<AlertId>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            agent_id,
            alert_id,
            detail: detail.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_execution_finalize() {
        let cycle = Uuid::new_v4();
        let mut pending = PendingExecution::start(AgentId::new("network"), cycle);
        assert_eq!(pending.begin_attempt(), 1);
        pending.record_error("timeout");
        assert_eq!(pending.begin_attempt(), 2);
        pending.record_emitted();
        pending.record_suppressed();

        let record = pending.finalize(ExecutionOutcome::Completed);
        assert_eq!(record.cycle_id, cycle);
        assert_eq!(record.attempts, 2);
        assert_eq!(record.alerts_emitted, 1);
        assert_eq!(record.alerts_suppressed, 1);
        assert_eq!(record.last_error.as_deref(), Some("timeout"));
        assert!(record.finished_at >= record.started_at);
        assert!(record.duration_ms() >= 0);
    }

    #[test]
    fn test_outcome_serialization() {
        assert_eq!(
            serde_json::to_string(&ExecutionOutcome::TimedOut).unwrap(),
            "\"timed_out\""
        );
        assert!(ExecutionOutcome::Completed.is_success());
        assert!(!ExecutionOutcome::Failed.is_success());
    }
}

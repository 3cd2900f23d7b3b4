//! Agent records: identity, lifecycle state, rolling accuracy and counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable agent identifier (e.g. `competitive`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Agent lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    /// Dispatched normally, accuracy backed by enough feedback
    Active,
    /// Dispatched normally, not enough feedback yet
    Learning,
    /// Never dispatched
    Disabled,
}

impl AgentState {
    #[must_use]
    pub const fn is_dispatchable(self) -> bool {
        !matches!(self, AgentState::Disabled)
    }
}

/// Persisted agent state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    pub state: AgentState,
    /// Rolling accuracy percentage, always within `[0, 100]`
    pub accuracy: f64,
    pub analyses_run: u64,
    pub alerts_generated: u64,
    pub successful_predictions: u64,
    /// Feedback events behind the current accuracy value
    pub feedback_samples: usize,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn new(id: AgentId, name: impl Into<String>, initial_accuracy: f64) -> Self {
        Self {
            id,
            name: name.into(),
            state: AgentState::Learning,
            accuracy: clamp_accuracy(initial_accuracy),
            analyses_run: 0,
            alerts_generated: 0,
            successful_predictions: 0,
            feedback_samples: 0,
            last_run_at: None,
            created_at: Utc::now(),
        }
    }

    /// Count one finished analysis and the alerts it produced.
    pub fn record_run(&mut self, alerts_generated: u64, at: DateTime<Utc>) {
        self.analyses_run += 1;
        self.alerts_generated += alerts_generated;
        self.last_run_at = Some(at);
    }

    /// Store a freshly computed accuracy and promote learning agents once
    /// enough feedback has accumulated.
    pub fn apply_accuracy(&mut self, accuracy: f64, samples: usize, min_samples: usize) {
        self.accuracy = clamp_accuracy(accuracy);
        self.feedback_samples = samples;
        if self.state == AgentState::Learning && samples >= min_samples {
            self.state = AgentState::Active;
        }
    }
}

/// Clamp to the `[0, 100]` percentage range; NaN collapses to zero.
#[must_use]
pub fn clamp_accuracy(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_agent_is_learning_and_clamped() {
        let agent = AgentRecord::new(AgentId::new("network"), "Network", 140.0);
        assert_eq!(agent.state, AgentState::Learning);
        assert!((agent.accuracy - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_apply_accuracy_promotes_after_min_samples() {
        let mut agent = AgentRecord::new(AgentId::new("network"), "Network", 75.0);
        agent.apply_accuracy(80.0, 2, 5);
        assert_eq!(agent.state, AgentState::Learning);
        agent.apply_accuracy(60.0, 5, 5);
        assert_eq!(agent.state, AgentState::Active);
        assert!((agent.accuracy - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_disabled_agent_stays_disabled() {
        let mut agent = AgentRecord::new(AgentId::new("network"), "Network", 75.0);
        agent.state = AgentState::Disabled;
        agent.apply_accuracy(90.0, 50, 5);
        assert_eq!(agent.state, AgentState::Disabled);
        assert!(!agent.state.is_dispatchable());
    }

    #[test]
    fn test_record_run() {
        let mut agent = AgentRecord::new(AgentId::new("performance"), "Performance", 90.0);
        let now = Utc::now();
        agent.record_run(3, now);
        agent.record_run(0, now);
        assert_eq!(agent.analyses_run, 2);
        assert_eq!(agent.alerts_generated, 3);
        assert_eq!(agent.last_run_at, Some(now));
    }

    #[test]
    fn test_clamp_accuracy_nan() {
        assert!(clamp_accuracy(f64::NAN).abs() < f64::EPSILON);
        assert!((clamp_accuracy(-5.0)).abs() < f64::EPSILON);
    }
}

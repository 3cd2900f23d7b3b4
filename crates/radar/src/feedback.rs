//! Operator feedback ingestion and rolling accuracy.
//!
//! Submissions are validated into immutable [`FeedbackEvent`]s before they
//! reach the ledger. The ledger appends the event, then recomputes the
//! agent's accuracy over the configured window:
//!
//! ```text
//! accuracy = positive / total * 100    (positive: rating >= threshold)
//! ```
//!
//! An empty window leaves accuracy unchanged. Concurrent updates for the
//! same agent are last-write-wins.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::FeedbackConfig;
use crate::error::{FeedbackError, StoreError};
use crate::health::HealthMonitor;
use crate::model::{
    Activity, ActivityKind, AgentId, AgentState, AlertId, FeedbackEvent, Rating,
};
use crate::store::Stores;

const ANONYMOUS: &str = "anonymous";

/// Raw feedback as received from the API. Every field is optional so that
/// missing fields surface as validation errors rather than parse failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSubmission {
    pub alert_id: Option<String>,
    pub agent_id: Option<String>,
    pub rater_id: Option<String>,
    pub rating: Option<i64>,
    pub comment: Option<String>,
    pub action_taken: Option<bool>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, FeedbackError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(FeedbackError::MissingField(field)),
    }
}

impl FeedbackSubmission {
    /// Validate into an event. Nothing is written.
    pub fn validate(self, max_comment_len: usize) -> Result<FeedbackEvent, FeedbackError> {
        let alert_id: AlertId = required(self.alert_id, "alertId")?
            .parse()
            .map_err(|e: uuid::Error| FeedbackError::InvalidField {
                field: "alertId",
                reason: e.to_string(),
            })?;
        let agent_id = AgentId::new(required(self.agent_id, "agentId")?);
        let rating = Rating::new(self.rating.ok_or(FeedbackError::MissingField("rating"))?)?;

        let comment = self
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if comment
            .as_ref()
            .is_some_and(|c| c.chars().count() > max_comment_len)
        {
            return Err(FeedbackError::CommentTooLong {
                max: max_comment_len,
            });
        }

        let rater_id = self
            .rater_id
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| ANONYMOUS.to_string());

        Ok(FeedbackEvent {
            id: Uuid::new_v4(),
            alert_id,
            agent_id,
            rater_id,
            rating,
            comment,
            action_taken: self.action_taken.unwrap_or(false),
            created_at: Utc::now(),
        })
    }
}

/// Result of recording one feedback event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyUpdate {
    pub feedback_id: Uuid,
    pub agent_id: AgentId,
    pub previous: f64,
    pub current: f64,
    /// Events inside the window used for `current`
    pub samples: usize,
    pub state: AgentState,
}

/// Positive ratio over `events` as a percentage, or `None` for an empty
/// window.
#[must_use]
pub fn rolling_accuracy(events: &[FeedbackEvent], positive_threshold: u8) -> Option<f64> {
    if events.is_empty() {
        return None;
    }
    let positive = events
        .iter()
        .filter(|e| e.is_positive(positive_threshold))
        .count();
    Some((positive as f64 / events.len() as f64 * 100.0).clamp(0.0, 100.0))
}

pub struct FeedbackLedger {
    config: FeedbackConfig,
    stores: Stores,
    health: Arc<HealthMonitor>,
}

impl FeedbackLedger {
    pub fn new(config: FeedbackConfig, stores: Stores, health: Arc<HealthMonitor>) -> Self {
        Self {
            config,
            stores,
            health,
        }
    }

    /// Validate and record a raw submission.
    pub async fn submit(
        &self,
        submission: FeedbackSubmission,
    ) -> Result<AccuracyUpdate, FeedbackError> {
        let event = submission.validate(self.config.max_comment_len)?;
        self.record(event).await
    }

    /// Append a validated event and recompute the agent's accuracy.
    pub async fn record(&self, event: FeedbackEvent) -> Result<AccuracyUpdate, FeedbackError> {
        let alert = self
            .track(self.stores.alerts.get(&event.alert_id).await)?
            .ok_or(FeedbackError::UnknownAlert(event.alert_id))?;
        if alert.agent_id != event.agent_id {
            return Err(FeedbackError::AgentMismatch {
                alert_id: event.alert_id,
                claimed: event.agent_id,
                actual: alert.agent_id,
            });
        }

        let agent_id = event.agent_id.clone();
        let before = self
            .track(self.stores.agents.get_agent(&agent_id).await)?
            .ok_or_else(|| StoreError::AgentNotFound(agent_id.clone()))?;

        let feedback_id = event.id;
        let action_taken = event.action_taken;
        let detail = format!("rating {} from {}", event.rating.value(), event.rater_id);
        self.track(self.stores.feedback.append(event).await)?;
        debug!(agent_id = %agent_id, alert_id = %alert.id, "Feedback recorded");

        let activity = Activity::new(
            ActivityKind::FeedbackRecorded,
            agent_id.clone(),
            Some(alert.id),
            detail,
        );
        if let Err(e) = self.stores.activity.append(activity).await {
            warn!(agent_id = %agent_id, error = %e, "Failed to record feedback activity");
        }

        if action_taken {
            self.track(
                self.stores
                    .agents
                    .record_successful_prediction(&agent_id)
                    .await,
            )?;
        }

        let update = self.recompute(&agent_id, before.accuracy).await?;
        Ok(AccuracyUpdate {
            feedback_id,
            ..update
        })
    }

    /// Recompute accuracy from the current window.
    async fn recompute(
        &self,
        agent_id: &AgentId,
        previous: f64,
    ) -> Result<AccuracyUpdate, FeedbackError> {
        let since = Utc::now() - Duration::days(i64::from(self.config.window_days));
        let window = self
            .track(self.stores.feedback.list_since(agent_id, since).await)?;

        let record = match rolling_accuracy(&window, self.config.positive_threshold) {
            Some(accuracy) => self.track(
                self.stores
                    .agents
                    .update_accuracy(agent_id, accuracy, window.len(), self.config.min_samples)
                    .await,
            )?,
            None => self
                .track(self.stores.agents.get_agent(agent_id).await)?
                .ok_or_else(|| StoreError::AgentNotFound(agent_id.clone()))?,
        };

        info!(
            agent_id = %agent_id,
            previous,
            current = record.accuracy,
            samples = window.len(),
            state = ?record.state,
            "Agent accuracy updated"
        );

        Ok(AccuracyUpdate {
            feedback_id: Uuid::nil(),
            agent_id: agent_id.clone(),
            previous,
            current: record.accuracy,
            samples: window.len(),
            state: record.state,
        })
    }

    fn track<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        self.health.observe(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Alert, AgentRecord, CandidateAlert, Category, Confidence, Priority};
    use crate::store::{AgentStore, AlertStore, MemoryStore};

    fn submission(alert: &AlertId, agent: &str, rating: i64) -> FeedbackSubmission {
        FeedbackSubmission {
            alert_id: Some(alert.to_string()),
            agent_id: Some(agent.to_string()),
            rating: Some(rating),
            ..FeedbackSubmission::default()
        }
    }

    async fn setup() -> (Arc<MemoryStore>, FeedbackLedger, AlertId) {
        let store = Arc::new(MemoryStore::new());
        store
            .ensure_agent(AgentRecord::new(AgentId::new("network"), "Network", 78.0))
            .await
            .unwrap();
        let alert = Alert::from_candidate(
            AgentId::new("network"),
            CandidateAlert::new(
                Category::Network,
                Priority::High,
                "Misconnection risk at LHR",
                "120 passengers",
                Confidence::new(0.8).unwrap(),
            ),
        );
        let alert_id = store.create(alert).await.unwrap();
        let ledger = FeedbackLedger::new(
            FeedbackConfig::default(),
            Stores::from_memory(store.clone()),
            Arc::new(HealthMonitor::default()),
        );
        (store, ledger, alert_id)
    }

    #[test]
    fn test_validation_defaults() {
        let alert = AlertId::new();
        let event = submission(&alert, "network", 4).validate(100).unwrap();
        assert_eq!(event.rater_id, "anonymous");
        assert!(!event.action_taken);
        assert_eq!(event.rating.value(), 4);
        assert!(event.comment.is_none());
    }

    #[test]
    fn test_validation_rejects_malformed() {
        let alert = AlertId::new();

        let mut s = submission(&alert, "network", 4);
        s.alert_id = None;
        assert!(matches!(s.validate(100), Err(FeedbackError::MissingField("alertId"))));

        let mut s = submission(&alert, "  ", 4);
        s.agent_id = Some("  ".to_string());
        assert!(matches!(s.validate(100), Err(FeedbackError::MissingField("agentId"))));

        let mut s = submission(&alert, "network", 4);
        s.rating = None;
        assert!(matches!(s.validate(100), Err(FeedbackError::MissingField("rating"))));

        assert!(matches!(
            submission(&alert, "network", 9).validate(100),
            Err(FeedbackError::Invalid(_))
        ));

        let mut s = submission(&alert, "network", 4);
        s.alert_id = Some("not-a-uuid".to_string());
        assert!(matches!(s.validate(100), Err(FeedbackError::InvalidField { .. })));

        let mut s = submission(&alert, "network", 4);
        s.comment = Some("x".repeat(11));
        assert!(matches!(s.validate(10), Err(FeedbackError::CommentTooLong { max: 10 })));
    }

    #[test]
    fn test_submission_parses_camel_case() {
        let s: FeedbackSubmission = serde_json::from_str(
            r#"{"alertId":"a","agentId":"b","raterId":"ops-1","rating":5,"actionTaken":true}"#,
        )
        .unwrap();
        assert_eq!(s.rater_id.as_deref(), Some("ops-1"));
        assert_eq!(s.action_taken, Some(true));
    }

    #[test]
    fn test_rolling_accuracy() {
        assert!(rolling_accuracy(&[], 4).is_none());
        let alert = AlertId::new();
        let events: Vec<FeedbackEvent> = [5, 4, 2, 1]
            .iter()
            .map(|r| submission(&alert, "network", *r).validate(100).unwrap())
            .collect();
        let accuracy = rolling_accuracy(&events, 4).unwrap();
        assert!((accuracy - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_record_updates_accuracy_and_promotes() {
        let (store, ledger, alert_id) = setup().await;

        for _ in 0..4 {
            let update = ledger.submit(submission(&alert_id, "network", 5)).await.unwrap();
            assert_eq!(update.state, AgentState::Learning);
        }
        let mut last = submission(&alert_id, "network", 2);
        last.action_taken = Some(true);
        let update = ledger.submit(last).await.unwrap();

        assert!((update.current - 80.0).abs() < 1e-9);
        assert_eq!(update.samples, 5);
        assert_eq!(update.state, AgentState::Active);
        assert_ne!(update.feedback_id, Uuid::nil());

        let record = store.get_agent(&AgentId::new("network")).await.unwrap().unwrap();
        assert_eq!(record.successful_predictions, 1);
        assert_eq!(record.feedback_samples, 5);
    }

    #[tokio::test]
    async fn test_unknown_alert_and_mismatch_rejected() {
        let (store, ledger, alert_id) = setup().await;

        let err = ledger
            .submit(submission(&AlertId::new(), "network", 4))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedbackError::UnknownAlert(_)));

        let err = ledger
            .submit(submission(&alert_id, "competitive", 4))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedbackError::AgentMismatch { .. }));

        let record = store.get_agent(&AgentId::new("network")).await.unwrap().unwrap();
        assert_eq!(record.feedback_samples, 0);
        assert!((record.accuracy - 78.0).abs() < f64::EPSILON);
    }
}

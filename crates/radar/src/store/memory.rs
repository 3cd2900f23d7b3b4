//! In-memory implementation of every store trait, with optional JSON
//! snapshots so a single-process deployment survives restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{ActivityLog, AgentStore, AlertFilter, AlertStore, ExecutionLog, FeedbackStore};
use crate::error::{StoreError, StoreResult};
use crate::model::{
    Activity, ActivityKind, AgentId, AgentRecord, Alert, AlertId, AlertStatus, ExecutionRecord,
    FeedbackEvent,
};

/// Snapshot-able contents of the store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Collections {
    alerts: Vec<Alert>,
    agents: BTreeMap<AgentId, AgentRecord>,
    executions: Vec<ExecutionRecord>,
    feedback: Vec<FeedbackEvent>,
    activity: Vec<Activity>,
}

/// Process-local store guarded by a single read-write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot, or start empty when the file does not exist.
    pub async fn load(path: &Path) -> StoreResult<Self> {
        if !tokio::fs::try_exists(path).await? {
            debug!(path = %path.display(), "No snapshot found, starting empty");
            return Ok(Self::new());
        }
        let content = tokio::fs::read_to_string(path).await?;
        let collections: Collections = serde_json::from_str(&content)?;
        info!(
            path = %path.display(),
            alerts = collections.alerts.len(),
            agents = collections.agents.len(),
            "Loaded store snapshot"
        );
        Ok(Self {
            inner: RwLock::new(collections),
        })
    }

    /// Write a snapshot atomically (temp file + rename).
    pub async fn save(&self, path: &Path) -> StoreResult<()> {
        let content = {
            let inner = self.inner.read().await;
            serde_json::to_string_pretty(&*inner)?
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), "Saved store snapshot");
        Ok(())
    }

    /// Activity entries, oldest first.
    pub async fn activity(&self) -> Vec<Activity> {
        self.inner.read().await.activity.clone()
    }

    pub async fn alert_count(&self) -> usize {
        self.inner.read().await.alerts.len()
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn create(&self, alert: Alert) -> StoreResult<AlertId> {
        let mut inner = self.inner.write().await;
        if inner.alerts.iter().any(|a| a.id == alert.id) {
            return Err(StoreError::Rejected(format!("duplicate alert id {}", alert.id)));
        }
        let id = alert.id;
        inner.alerts.push(alert);
        Ok(id)
    }

    async fn get(&self, id: &AlertId) -> StoreResult<Option<Alert>> {
        let inner = self.inner.read().await;
        Ok(inner.alerts.iter().find(|a| a.id == *id).cloned())
    }

    async fn list_recent(&self, filter: &AlertFilter, limit: usize) -> StoreResult<Vec<Alert>> {
        let inner = self.inner.read().await;
        let mut alerts: Vec<Alert> = inner
            .alerts
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts.truncate(limit);
        Ok(alerts)
    }

    async fn update_status(&self, id: &AlertId, status: AlertStatus) -> StoreResult<Alert> {
        let mut inner = self.inner.write().await;
        let alert = inner
            .alerts
            .iter_mut()
            .find(|a| a.id == *id)
            .ok_or(StoreError::AlertNotFound(*id))?;
        let previous = alert.status;
        alert.set_status(status)?;
        let updated = alert.clone();
        inner.activity.push(Activity::new(
            ActivityKind::AlertStatusChanged,
            updated.agent_id.clone(),
            Some(updated.id),
            format!("{previous} -> {status}"),
        ));
        Ok(updated)
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn list_agents(&self) -> StoreResult<Vec<AgentRecord>> {
        Ok(self.inner.read().await.agents.values().cloned().collect())
    }

    async fn get_agent(&self, id: &AgentId) -> StoreResult<Option<AgentRecord>> {
        Ok(self.inner.read().await.agents.get(id).cloned())
    }

    async fn ensure_agent(&self, record: AgentRecord) -> StoreResult<AgentRecord> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .agents
            .entry(record.id.clone())
            .or_insert(record)
            .clone())
    }

    async fn record_run(
        &self,
        id: &AgentId,
        alerts_generated: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<AgentRecord> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(id)
            .ok_or_else(|| StoreError::AgentNotFound(id.clone()))?;
        agent.record_run(alerts_generated, at);
        Ok(agent.clone())
    }

    async fn update_accuracy(
        &self,
        id: &AgentId,
        accuracy: f64,
        samples: usize,
        min_samples: usize,
    ) -> StoreResult<AgentRecord> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(id)
            .ok_or_else(|| StoreError::AgentNotFound(id.clone()))?;
        agent.apply_accuracy(accuracy, samples, min_samples);
        Ok(agent.clone())
    }

    async fn record_successful_prediction(&self, id: &AgentId) -> StoreResult<AgentRecord> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(id)
            .ok_or_else(|| StoreError::AgentNotFound(id.clone()))?;
        agent.successful_predictions += 1;
        Ok(agent.clone())
    }
}

#[async_trait]
impl ExecutionLog for MemoryStore {
    async fn append(&self, record: ExecutionRecord) -> StoreResult<()> {
        self.inner.write().await.executions.push(record);
        Ok(())
    }

    async fn list_for_agent(
        &self,
        id: &AgentId,
        limit: usize,
    ) -> StoreResult<Vec<ExecutionRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .executions
            .iter()
            .rev()
            .filter(|r| r.agent_id == *id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FeedbackStore for MemoryStore {
    async fn append(&self, event: FeedbackEvent) -> StoreResult<()> {
        self.inner.write().await.feedback.push(event);
        Ok(())
    }

    async fn list_since(
        &self,
        agent_id: &AgentId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<FeedbackEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .feedback
            .iter()
            .filter(|e| e.agent_id == *agent_id && e.created_at >= since)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ActivityLog for MemoryStore {
    async fn append(&self, activity: Activity) -> StoreResult<()> {
        self.inner.write().await.activity.push(activity);
        Ok(())
    }
}

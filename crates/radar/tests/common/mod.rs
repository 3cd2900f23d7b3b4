//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use radar::agents::{Agent, AgentRegistry, DetectionContext};
use radar::completion::DisabledCompletion;
use radar::config::RadarConfig;
use radar::error::{AgentError, StoreError, StoreResult};
use radar::model::{
    Activity, AgentId, AgentRecord, Alert, AlertId, AlertStatus, CandidateAlert, Category,
    Confidence, ExecutionRecord, FeedbackEvent, Priority,
};
use radar::service::RadarService;
use radar::store::{
    ActivityLog, AgentStore, AlertFilter, AlertStore, ExecutionLog, FeedbackStore, Stores,
};

// ============================================================================
// Agents
// ============================================================================

/// How a [`ScriptedAgent`] behaves on each call.
#[derive(Debug, Clone)]
pub enum Script {
    /// Return the candidates, after an optional delay
    Emit {
        candidates: Vec<CandidateAlert>,
        delay: Option<Duration>,
    },
    /// Fail every attempt
    Fail(String),
    /// Never return
    Hang,
}

pub struct ScriptedAgent {
    id: AgentId,
    script: Script,
    calls: AtomicU32,
}

impl ScriptedAgent {
    pub fn new(id: &str, script: Script) -> Self {
        Self {
            id: AgentId::new(id),
            script,
            calls: AtomicU32::new(0),
        }
    }

    pub fn emitting(id: &str, candidates: Vec<CandidateAlert>) -> Self {
        Self::new(
            id,
            Script::Emit {
                candidates,
                delay: None,
            },
        )
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn name(&self) -> &str {
        self.id.as_str()
    }

    async fn detect(&self, _ctx: &DetectionContext) -> Result<Vec<CandidateAlert>, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Emit { candidates, delay } => {
                if let Some(delay) = delay {
                    tokio::time::sleep(*delay).await;
                }
                Ok(candidates.clone())
            }
            Script::Fail(message) => Err(AgentError::Dependency(message.clone())),
            Script::Hang => std::future::pending().await,
        }
    }
}

pub fn candidate(title: &str, route: &str, confidence: f64) -> CandidateAlert {
    CandidateAlert::new(
        Category::Competitive,
        Priority::High,
        title,
        format!("{title}. Observed in the latest fare filing."),
        Confidence::new(confidence).unwrap(),
    )
    .with_route(route)
}

/// Registry holding exactly the given agents.
pub fn registry(agents: Vec<Arc<dyn Agent>>) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for agent in agents {
        registry.register(agent);
    }
    registry
}

/// Service over `stores` with every agent dispatched on every cycle.
pub fn forced_service(stores: Stores, registry: AgentRegistry) -> RadarService {
    let mut config = RadarConfig::default();
    config.scheduler.force_all = true;
    config.agents.seed = Some(7);
    RadarService::new(config, stores, registry, Arc::new(DisabledCompletion))
}

// ============================================================================
// Stores
// ============================================================================

/// A store whose backend is unreachable for every call.
#[derive(Debug, Default)]
pub struct OfflineStore;

fn offline<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl AlertStore for OfflineStore {
    async fn create(&self, _alert: Alert) -> StoreResult<AlertId> {
        offline()
    }

    async fn get(&self, _id: &AlertId) -> StoreResult<Option<Alert>> {
        offline()
    }

    async fn list_recent(&self, _filter: &AlertFilter, _limit: usize) -> StoreResult<Vec<Alert>> {
        offline()
    }

    async fn update_status(&self, _id: &AlertId, _status: AlertStatus) -> StoreResult<Alert> {
        offline()
    }
}

#[async_trait]
impl AgentStore for OfflineStore {
    async fn list_agents(&self) -> StoreResult<Vec<AgentRecord>> {
        offline()
    }

    async fn get_agent(&self, _id: &AgentId) -> StoreResult<Option<AgentRecord>> {
        offline()
    }

    async fn ensure_agent(&self, _record: AgentRecord) -> StoreResult<AgentRecord> {
        offline()
    }

    async fn record_run(
        &self,
        _id: &AgentId,
        _alerts_generated: u64,
        _at: DateTime<Utc>,
    ) -> StoreResult<AgentRecord> {
        offline()
    }

    async fn update_accuracy(
        &self,
        _id: &AgentId,
        _accuracy: f64,
        _samples: usize,
        _min_samples: usize,
    ) -> StoreResult<AgentRecord> {
        offline()
    }

    async fn record_successful_prediction(&self, _id: &AgentId) -> StoreResult<AgentRecord> {
        offline()
    }
}

#[async_trait]
impl ExecutionLog for OfflineStore {
    async fn append(&self, _record: ExecutionRecord) -> StoreResult<()> {
        offline()
    }

    async fn list_for_agent(
        &self,
        _id: &AgentId,
        _limit: usize,
    ) -> StoreResult<Vec<ExecutionRecord>> {
        offline()
    }
}

#[async_trait]
impl FeedbackStore for OfflineStore {
    async fn append(&self, _event: FeedbackEvent) -> StoreResult<()> {
        offline()
    }

    async fn list_since(
        &self,
        _agent_id: &AgentId,
        _since: DateTime<Utc>,
    ) -> StoreResult<Vec<FeedbackEvent>> {
        offline()
    }
}

#[async_trait]
impl ActivityLog for OfflineStore {
    async fn append(&self, _activity: Activity) -> StoreResult<()> {
        offline()
    }
}

impl OfflineStore {
    pub fn stores() -> Stores {
        let store = Arc::new(OfflineStore);
        Stores {
            alerts: store.clone(),
            agents: store.clone(),
            executions: store.clone(),
            feedback: store.clone(),
            activity: store,
        }
    }
}

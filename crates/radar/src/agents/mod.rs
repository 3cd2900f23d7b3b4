//! Analysis agents.
//!
//! Each agent is a named detector that returns zero or more candidate alerts
//! when invoked. Agents never write to the store; the runner does that.
//!
//! # Agents
//! - `competitive`: competitor fare cuts and capacity moves
//! - `performance`: load factor and unit revenue against forecast
//! - `network`: misconnections and hub disruption
//! - `scenario-*`: pre-authored exemplar alerts for demos and cold start

pub mod competitive;
pub mod network;
pub mod performance;
pub mod scenario;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;
use uuid::Uuid;

use crate::completion::CompletionProvider;
use crate::config::AgentsConfig;
use crate::error::{AgentError, StoreResult};
use crate::model::{AgentId, AgentRecord, CandidateAlert};
use crate::store::AgentStore;

pub use competitive::CompetitiveAgent;
pub use network::NetworkAgent;
pub use performance::PerformanceAgent;
pub use scenario::ScenarioGenerator;

/// Whether an agent is a real detector or a scenario generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Detector,
    Scenario,
}

/// Inputs shared by every agent within one cycle.
#[derive(Clone)]
pub struct DetectionContext {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Routes under watch, e.g. `LHR-JFK`
    pub routes: Arc<[String]>,
    pub completion: Arc<dyn CompletionProvider>,
}

impl DetectionContext {
    pub fn new(routes: Arc<[String]>, completion: Arc<dyn CompletionProvider>) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started_at: Utc::now(),
            routes,
            completion,
        }
    }
}

/// A detector capable of producing candidate alerts.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &AgentId;

    fn name(&self) -> &str;

    fn kind(&self) -> AgentKind {
        AgentKind::Detector
    }

    /// Accuracy used when the agent record is first created.
    fn initial_accuracy(&self) -> f64 {
        75.0
    }

    async fn detect(&self, ctx: &DetectionContext) -> Result<Vec<CandidateAlert>, AgentError>;
}

/// Seedable random source shared by the simulated detectors.
///
/// The lock is only held for synchronous draws, never across an await.
#[derive(Debug)]
pub struct SimRng(Mutex<StdRng>);

impl SimRng {
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self(Mutex::new(rng))
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        let mut rng = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }
}

/// Derive a per-agent seed so seeded agents don't produce identical streams.
pub(crate) fn derive_seed(seed: Option<u64>, salt: u64) -> Option<u64> {
    seed.map(|s| s.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(salt))
}

/// Registry of all agents, keyed by id.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<AgentId, Arc<dyn Agent>>,
}

impl AgentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The three built-in detectors plus the built-in scenario generators.
    #[must_use]
    pub fn builtin(config: &AgentsConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CompetitiveAgent::new(config)));
        registry.register(Arc::new(PerformanceAgent::new(config)));
        registry.register(Arc::new(NetworkAgent::new(config)));
        for generator in ScenarioGenerator::builtin(config.seed) {
            registry.register(Arc::new(generator));
        }
        registry
    }

    /// Add an agent, replacing any previous agent with the same id.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.id().clone(), agent);
    }

    #[must_use]
    pub fn get(&self, id: &AgentId) -> Option<Arc<dyn Agent>> {
        self.agents.get(id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Agent>> {
        self.agents.values()
    }

    pub fn of_kind(&self, kind: AgentKind) -> impl Iterator<Item = &Arc<dyn Agent>> {
        self.agents.values().filter(move |a| a.kind() == kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Create an agent record for every registered agent that lacks one.
    pub async fn seed_records(&self, store: &dyn AgentStore) -> StoreResult<Vec<AgentRecord>> {
        let mut records = Vec::with_capacity(self.agents.len());
        for agent in self.agents.values() {
            let record = AgentRecord::new(
                agent.id().clone(),
                agent.name().to_string(),
                agent.initial_accuracy(),
            );
            let stored = store.ensure_agent(record).await?;
            debug!(agent_id = %stored.id, accuracy = stored.accuracy, "Agent record ready");
            records.push(stored);
        }
        Ok(records)
    }
}

/// Pick a route from the context; agents fall back to a placeholder when no
/// routes are configured.
pub(crate) fn pick_route(rng: &mut StdRng, routes: &[String]) -> String {
    use rand::seq::SliceRandom;
    routes
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| "NETWORK".to_string())
}

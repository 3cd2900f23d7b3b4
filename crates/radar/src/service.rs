//! Wiring of the core components from one [`RadarConfig`].

use std::sync::Arc;
use tracing::info;

use crate::agents::AgentRegistry;
use crate::completion::{CompletionProvider, DisabledCompletion};
use crate::config::RadarConfig;
use crate::error::StoreResult;
use crate::feedback::FeedbackLedger;
use crate::health::HealthMonitor;
use crate::model::AgentRecord;
use crate::runner::AgentRunner;
use crate::scheduler::Scheduler;
use crate::store::Stores;

/// The assembled engine: scheduler, feedback ledger and the shared stores
/// and health signal they report into.
#[derive(Clone)]
pub struct RadarService {
    pub config: Arc<RadarConfig>,
    pub stores: Stores,
    pub health: Arc<HealthMonitor>,
    pub registry: AgentRegistry,
    pub scheduler: Arc<Scheduler>,
    pub ledger: Arc<FeedbackLedger>,
}

impl RadarService {
    pub fn new(
        config: RadarConfig,
        stores: Stores,
        registry: AgentRegistry,
        completion: Arc<dyn CompletionProvider>,
    ) -> Self {
        let health = Arc::new(HealthMonitor::new(config.health.unhealthy_after));
        let runner = Arc::new(AgentRunner::new(
            config.runner.clone(),
            config.dedup.clone(),
            stores.clone(),
            health.clone(),
        ));
        let scheduler = Scheduler::new(
            config.scheduler.clone(),
            registry.clone(),
            runner,
            stores.clone(),
            health.clone(),
        )
        .with_routes(config.routes.clone())
        .with_completion(completion)
        .with_seed(config.agents.seed);
        let ledger = FeedbackLedger::new(config.feedback.clone(), stores.clone(), health.clone());

        Self {
            config: Arc::new(config),
            stores,
            health,
            registry,
            scheduler: Arc::new(scheduler),
            ledger: Arc::new(ledger),
        }
    }

    /// Built-in roster, no completion provider.
    #[must_use]
    pub fn builtin(config: RadarConfig, stores: Stores) -> Self {
        let registry = AgentRegistry::builtin(&config.agents);
        Self::new(config, stores, registry, Arc::new(DisabledCompletion))
    }

    /// Create agent records for the roster. Idempotent.
    pub async fn bootstrap(&self) -> StoreResult<Vec<AgentRecord>> {
        let result = self.registry.seed_records(self.stores.agents.as_ref()).await;
        self.health.observe(&result);
        let records = result?;
        info!(agents = records.len(), "Agent roster ready");
        Ok(records)
    }
}

//! Agent runner.
//!
//! Invokes one agent with bounded retry and a per-attempt timeout, filters the
//! result through the deduplication filter and persists what survives. Every
//! invocation yields exactly one [`ExecutionRecord`]; failures are recorded,
//! never propagated to the scheduler.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agents::{Agent, DetectionContext};
use crate::config::{DedupConfig, RunnerConfig};
use crate::dedup::{DedupDecision, DeduplicationFilter};
use crate::health::HealthMonitor;
use crate::model::{
    Activity, ActivityKind, AgentId, Alert, AlertId, CandidateAlert, ExecutionOutcome,
    ExecutionRecord, PendingExecution,
};
use crate::store::Stores;

const HARD_STOP: &str = "hard stop requested";

/// Result of one runner invocation.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub record: ExecutionRecord,
    /// Ids of the alerts persisted by this run
    pub alerts: Vec<AlertId>,
}

/// How the detection phase ended.
enum Detection {
    Candidates(Vec<CandidateAlert>),
    Exhausted { timed_out: bool },
    Cancelled,
}

pub struct AgentRunner {
    config: RunnerConfig,
    stores: Stores,
    dedup: DeduplicationFilter,
    health: Arc<HealthMonitor>,
}

impl AgentRunner {
    pub fn new(
        config: RunnerConfig,
        dedup: DedupConfig,
        stores: Stores,
        health: Arc<HealthMonitor>,
    ) -> Self {
        let dedup = DeduplicationFilter::new(dedup, stores.alerts.clone());
        Self {
            config,
            stores,
            dedup,
            health,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.saturating_add(1)
    }

    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.config.attempt_timeout_secs)
    }

    /// Linear backoff: the wait after failed attempt `n` is `n * base_delay`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.config.base_delay_ms.saturating_mul(u64::from(attempt)))
    }

    /// Run one agent to completion.
    ///
    /// `hard_stop` abandons the current detection attempt or backoff wait.
    /// Writes that have already started are allowed to finish.
    pub async fn run(
        &self,
        agent: Arc<dyn Agent>,
        ctx: &DetectionContext,
        hard_stop: &CancellationToken,
    ) -> RunReport {
        let agent_id = agent.id().clone();
        let mut pending = PendingExecution::start(agent_id.clone(), ctx.cycle_id);
        let mut alerts = Vec::new();

        let mut outcome = match self.detect(agent.as_ref(), ctx, &mut pending, hard_stop).await {
            Detection::Candidates(candidates) => {
                self.persist(&agent_id, candidates, &mut pending, &mut alerts)
                    .await
            }
            Detection::Exhausted { timed_out } => {
                warn!(
                    agent_id = %agent_id,
                    attempts = pending.attempts(),
                    timed_out,
                    "Agent failed after all attempts"
                );
                if timed_out {
                    ExecutionOutcome::TimedOut
                } else {
                    ExecutionOutcome::Failed
                }
            }
            Detection::Cancelled => {
                info!(agent_id = %agent_id, "Agent run abandoned by hard stop");
                pending.record_error(HARD_STOP);
                ExecutionOutcome::Failed
            }
        };

        let emitted = u64::try_from(pending.alerts_emitted()).unwrap_or(u64::MAX);
        let counters = self.stores.agents.record_run(&agent_id, emitted, Utc::now()).await;
        self.health.observe(&counters);
        if let Err(e) = counters {
            error!(agent_id = %agent_id, error = %e, "Failed to update agent counters");
            pending.record_error(format!("counter update failed: {e}"));
            if outcome.is_success() {
                outcome = ExecutionOutcome::Failed;
            }
        }

        let record = pending.finalize(outcome);
        let appended = self.stores.executions.append(record.clone()).await;
        self.health.observe(&appended);
        if let Err(e) = appended {
            error!(agent_id = %agent_id, error = %e, "Failed to append execution record");
        }

        info!(
            agent_id = %agent_id,
            cycle_id = %record.cycle_id,
            outcome = ?record.outcome,
            attempts = record.attempts,
            emitted = record.alerts_emitted,
            suppressed = record.alerts_suppressed,
            duration_ms = record.duration_ms(),
            "Agent run finished"
        );

        RunReport { record, alerts }
    }

    async fn detect(
        &self,
        agent: &dyn Agent,
        ctx: &DetectionContext,
        pending: &mut PendingExecution,
        hard_stop: &CancellationToken,
    ) -> Detection {
        let max_attempts = self.max_attempts();
        let attempt_timeout = self.attempt_timeout();

        loop {
            if hard_stop.is_cancelled() {
                return Detection::Cancelled;
            }
            let attempt = pending.begin_attempt();
            debug!(agent_id = %agent.id(), attempt, max_attempts, "Invoking agent");

            let result = tokio::select! {
                biased;
                () = hard_stop.cancelled() => return Detection::Cancelled,
                r = tokio::time::timeout(attempt_timeout, agent.detect(ctx)) => r,
            };

            let timed_out = match result {
                Ok(Ok(candidates)) => return Detection::Candidates(candidates),
                Ok(Err(e)) => {
                    warn!(agent_id = %agent.id(), attempt, error = %e, "Agent attempt failed");
                    pending.record_error(e.to_string());
                    false
                }
                Err(_) => {
                    warn!(
                        agent_id = %agent.id(),
                        attempt,
                        timeout_secs = attempt_timeout.as_secs(),
                        "Agent attempt timed out"
                    );
                    pending.record_error(format!(
                        "attempt timed out after {}s",
                        attempt_timeout.as_secs()
                    ));
                    true
                }
            };

            if attempt >= max_attempts {
                return Detection::Exhausted { timed_out };
            }

            tokio::select! {
                biased;
                () = hard_stop.cancelled() => return Detection::Cancelled,
                () = tokio::time::sleep(self.backoff(attempt)) => {}
            }
        }
    }

    /// Dedup and persist candidates in order.
    async fn persist(
        &self,
        agent_id: &AgentId,
        candidates: Vec<CandidateAlert>,
        pending: &mut PendingExecution,
        persisted: &mut Vec<AlertId>,
    ) -> ExecutionOutcome {
        let mut write_failed = false;

        for candidate in candidates {
            let decision = match self.dedup.check(agent_id, &candidate).await {
                Ok(decision) => {
                    self.health.record_success();
                    decision
                }
                Err(e) => {
                    warn!(agent_id = %agent_id, error = %e, "Dedup lookup failed, accepting candidate");
                    self.health.record_failure(&e);
                    DedupDecision::Accept
                }
            };
            if decision.is_duplicate() {
                pending.record_suppressed();
                continue;
            }

            let alert = Alert::from_candidate(agent_id.clone(), candidate);
            let detail = format!("{} [{}] {}", alert.category, alert.priority, alert.title);
            match self.stores.alerts.create(alert).await {
                Ok(id) => {
                    self.health.record_success();
                    pending.record_emitted();
                    persisted.push(id);
                    let activity =
                        Activity::new(ActivityKind::AlertCreated, agent_id.clone(), Some(id), detail);
                    if let Err(e) = self.stores.activity.append(activity).await {
                        warn!(alert_id = %id, error = %e, "Failed to record activity");
                    }
                }
                Err(e) => {
                    error!(agent_id = %agent_id, error = %e, "Failed to persist alert, dropping it");
                    self.health.record_failure(&e);
                    pending.record_error(format!("persist failed: {e}"));
                    write_failed = true;
                }
            }
        }

        if write_failed {
            ExecutionOutcome::Failed
        } else {
            ExecutionOutcome::Completed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::DisabledCompletion;
    use crate::error::AgentError;
    use crate::model::{AgentRecord, Category, Confidence, Priority};
    use crate::store::{AgentStore, ExecutionLog, MemoryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times, then returns `candidates`.
    struct FlakyAgent {
        id: AgentId,
        failures: u32,
        calls: AtomicU32,
        candidates: Vec<CandidateAlert>,
    }

    #[async_trait]
    impl Agent for FlakyAgent {
        fn id(&self) -> &AgentId {
            &self.id
        }

        fn name(&self) -> &str {
            "Flaky"
        }

        async fn detect(&self, _ctx: &DetectionContext) -> Result<Vec<CandidateAlert>, AgentError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(AgentError::Dependency(format!("call {call} failed")));
            }
            Ok(self.candidates.clone())
        }
    }

    /// Never returns.
    struct HangingAgent(AgentId);

    #[async_trait]
    impl Agent for HangingAgent {
        fn id(&self) -> &AgentId {
            &self.0
        }

        fn name(&self) -> &str {
            "Hanging"
        }

        async fn detect(&self, _ctx: &DetectionContext) -> Result<Vec<CandidateAlert>, AgentError> {
            std::future::pending().await
        }
    }

    fn candidate(title: &str) -> CandidateAlert {
        CandidateAlert::new(
            Category::Performance,
            Priority::Medium,
            title,
            "Load factor below forecast",
            Confidence::new(0.7).unwrap(),
        )
        .with_route("LHR-DXB")
    }

    async fn setup(id: &str) -> (Arc<MemoryStore>, AgentRunner) {
        let store = Arc::new(MemoryStore::new());
        store
            .ensure_agent(AgentRecord::new(AgentId::new(id), id, 80.0))
            .await
            .unwrap();
        let runner = AgentRunner::new(
            RunnerConfig::default(),
            DedupConfig::default(),
            Stores::from_memory(store.clone()),
            Arc::new(HealthMonitor::default()),
        );
        (store, runner)
    }

    fn ctx() -> DetectionContext {
        DetectionContext::new(vec!["LHR-DXB".to_string()].into(), Arc::new(DisabledCompletion))
    }

    #[test]
    fn test_linear_backoff() {
        let runner = AgentRunner::new(
            RunnerConfig {
                max_retries: 2,
                attempt_timeout_secs: 30,
                base_delay_ms: 2000,
            },
            DedupConfig::default(),
            Stores::in_memory(),
            Arc::new(HealthMonitor::default()),
        );
        assert_eq!(runner.max_attempts(), 3);
        assert_eq!(runner.backoff(1), Duration::from_secs(2));
        assert_eq!(runner.backoff(2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success_persists() {
        let (store, runner) = setup("flaky").await;
        let agent = Arc::new(FlakyAgent {
            id: AgentId::new("flaky"),
            failures: 1,
            calls: AtomicU32::new(0),
            candidates: vec![candidate("LF gap on LHR-DXB")],
        });

        let report = runner.run(agent, &ctx(), &CancellationToken::new()).await;
        assert_eq!(report.record.outcome, ExecutionOutcome::Completed);
        assert_eq!(report.record.attempts, 2);
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(store.alert_count().await, 1);

        let record = store.get_agent(&AgentId::new("flaky")).await.unwrap().unwrap();
        assert_eq!(record.analyses_run, 1);
        assert_eq!(record.alerts_generated, 1);
        assert!(record.last_run_at.is_some());

        let activity = store.activity().await;
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].kind, ActivityKind::AlertCreated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_within_run_are_suppressed() {
        let (store, runner) = setup("flaky").await;
        let agent = Arc::new(FlakyAgent {
            id: AgentId::new("flaky"),
            failures: 0,
            calls: AtomicU32::new(0),
            candidates: vec![candidate("LF gap on LHR-DXB"), candidate("LF gap on LHR-DXB")],
        });

        let report = runner.run(agent, &ctx(), &CancellationToken::new()).await;
        assert_eq!(report.record.alerts_emitted, 1);
        assert_eq!(report.record.alerts_suppressed, 1);
        assert_eq!(store.alert_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_exhaust_as_timed_out() {
        let (store, runner) = setup("hang").await;
        let agent = Arc::new(HangingAgent(AgentId::new("hang")));

        let report = runner.run(agent, &ctx(), &CancellationToken::new()).await;
        assert_eq!(report.record.outcome, ExecutionOutcome::TimedOut);
        assert_eq!(report.record.attempts, 3);
        assert!(report.alerts.is_empty());

        let log = store.list_for_agent(&AgentId::new("hang"), 10).await.unwrap();
        assert_eq!(log.len(), 1);
        let record = store.get_agent(&AgentId::new("hang")).await.unwrap().unwrap();
        assert_eq!(record.analyses_run, 1);
        assert_eq!(record.alerts_generated, 0);
        assert!(record.last_run_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_stop_abandons_attempt() {
        let (store, runner) = setup("hang").await;
        let agent = Arc::new(HangingAgent(AgentId::new("hang")));
        let token = CancellationToken::new();

        let stopper = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stopper.cancel();
        });

        let report = runner.run(agent, &ctx(), &token).await;
        assert_eq!(report.record.outcome, ExecutionOutcome::Failed);
        assert_eq!(report.record.attempts, 1);
        assert_eq!(report.record.last_error.as_deref(), Some(HARD_STOP));

        let record = store.get_agent(&AgentId::new("hang")).await.unwrap().unwrap();
        assert_eq!(record.analyses_run, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_agent_record_fails_run() {
        let store = Arc::new(MemoryStore::new());
        let runner = AgentRunner::new(
            RunnerConfig::default(),
            DedupConfig::default(),
            Stores::from_memory(store.clone()),
            Arc::new(HealthMonitor::default()),
        );
        let agent = Arc::new(FlakyAgent {
            id: AgentId::new("unseeded"),
            failures: 0,
            calls: AtomicU32::new(0),
            candidates: Vec::new(),
        });

        let report = runner.run(agent, &ctx(), &CancellationToken::new()).await;
        assert_eq!(report.record.outcome, ExecutionOutcome::Failed);
        assert!(report
            .record
            .last_error
            .as_deref()
            .is_some_and(|e| e.starts_with("counter update failed")));
    }
}

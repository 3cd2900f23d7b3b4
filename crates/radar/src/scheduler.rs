//! Cycle scheduler.
//!
//! Owns the timer and the cycle-execution path. Each cycle selects agents
//! probabilistically (biased by accuracy), fans out one runner task per
//! selected agent and waits for all of them.
//!
//! ```text
//! idle --(timer tick | trigger)--> running --(all runners joined)--> idle
//!   \______________________ stop / hard_stop ______________________/--> stopped
//! ```
//!
//! Only one cycle runs at a time. A manual trigger that arrives while a cycle
//! is in flight is coalesced into it. A timer tick that lands during a manual
//! cycle is deferred and runs once that cycle finishes.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agents::{Agent, AgentKind, AgentRegistry, DetectionContext, SimRng};
use crate::completion::{CompletionProvider, DisabledCompletion};
use crate::config::{SchedulerConfig, MAX_INTERVAL_MINUTES};
use crate::health::HealthMonitor;
use crate::model::{AgentId, AgentRecord};
use crate::runner::{AgentRunner, RunReport};
use crate::store::Stores;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    #[default]
    Idle,
    Running,
    Stopped,
}

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleTrigger {
    Timer,
    Manual,
}

impl fmt::Display for CycleTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleTrigger::Timer => f.write_str("timer"),
            CycleTrigger::Manual => f.write_str("manual"),
        }
    }
}

/// Result of a manual trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum TriggerOutcome {
    /// A new cycle was dispatched
    Started {
        #[serde(rename = "cycleId")]
        cycle_id: Uuid,
    },
    /// A cycle was already in flight; no second cycle was started
    Coalesced,
    /// The scheduler has been shut down
    Stopped,
}

/// Summary recorded at the end of every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    pub trigger: CycleTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    /// Detector runs that finished
    pub agents_run: usize,
    /// Scenario generator runs that finished
    pub scenarios_run: usize,
    pub failed_runs: usize,
    pub alerts_emitted: usize,
    pub alerts_suppressed: usize,
    /// The cycle deadline expired before every runner joined
    pub timed_out: bool,
}

/// Scheduler introspection.
///
/// `is_running` reports whether the timer is active; `state` reports
/// whether a cycle is currently executing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub is_running: bool,
    pub interval_minutes: u64,
    pub last_run_time: Option<DateTime<Utc>>,
    pub next_run_time: Option<DateTime<Utc>>,
    pub last_cycle: Option<CycleSummary>,
    pub healthy: bool,
}

/// Dispatch probability after accuracy bias:
/// `base * (floor + (1 - floor) * accuracy / 100)`, clamped to `[0, 1]`.
#[must_use]
pub fn effective_probability(base: f64, accuracy: f64, floor: f64) -> f64 {
    let accuracy = accuracy.clamp(0.0, 100.0) / 100.0;
    let p = base * (floor + (1.0 - floor) * accuracy);
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: SchedulerState,
    timer_active: bool,
    last_run_time: Option<DateTime<Utc>>,
    next_run_time: Option<DateTime<Utc>>,
    timer: Option<JoinHandle<()>>,
    manual: Vec<JoinHandle<()>>,
}

/// Clears the in-flight flag when the cycle ends, including on panic.
struct CycleGuard(Arc<AtomicBool>);

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Clears the timer flag when the timer task exits, however it exits.
struct TimerGuard<'a>(&'a Scheduler);

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.0.lock();
        inner.timer_active = false;
        inner.next_run_time = None;
    }
}

enum Claim {
    Granted(CycleGuard),
    Busy,
    Stopped,
}

#[derive(Debug, Default)]
struct Tally {
    agents_run: usize,
    scenarios_run: usize,
    failed_runs: usize,
    alerts_emitted: usize,
    alerts_suppressed: usize,
}

impl Tally {
    fn add(&mut self, kind: AgentKind, report: &RunReport) {
        match kind {
            AgentKind::Detector => self.agents_run += 1,
            AgentKind::Scenario => self.scenarios_run += 1,
        }
        if !report.record.outcome.is_success() {
            self.failed_runs += 1;
        }
        self.alerts_emitted += report.record.alerts_emitted;
        self.alerts_suppressed += report.record.alerts_suppressed;
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    registry: AgentRegistry,
    runner: Arc<AgentRunner>,
    stores: Stores,
    health: Arc<HealthMonitor>,
    routes: Arc<[String]>,
    completion: Arc<dyn CompletionProvider>,
    rng: SimRng,
    in_flight: Arc<AtomicBool>,
    stop: CancellationToken,
    hard_stop: CancellationToken,
    inner: Mutex<Inner>,
    cycles: watch::Sender<Option<CycleSummary>>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        registry: AgentRegistry,
        runner: Arc<AgentRunner>,
        stores: Stores,
        health: Arc<HealthMonitor>,
    ) -> Self {
        let (cycles, _) = watch::channel(None);
        Self {
            config,
            registry,
            runner,
            stores,
            health,
            routes: Arc::from(Vec::new()),
            completion: Arc::new(DisabledCompletion),
            rng: SimRng::new(None),
            in_flight: Arc::new(AtomicBool::new(false)),
            stop: CancellationToken::new(),
            hard_stop: CancellationToken::new(),
            inner: Mutex::new(Inner::default()),
            cycles,
        }
    }

    #[must_use]
    pub fn with_routes(mut self, routes: Vec<String>) -> Self {
        self.routes = routes.into();
        self
    }

    #[must_use]
    pub fn with_completion(mut self, completion: Arc<dyn CompletionProvider>) -> Self {
        self.completion = completion;
        self
    }

    /// Seed the dispatch draw for reproducible selection.
    #[must_use]
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.rng = SimRng::new(seed);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receiver notified with each finished cycle's summary.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<CycleSummary>> {
        self.cycles.subscribe()
    }

    /// Start the timer. The first cycle fires immediately. Returns `false`
    /// when already started or stopped.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut inner = self.lock();
        if inner.timer_active || inner.state == SchedulerState::Stopped {
            return false;
        }
        inner.timer_active = true;
        inner.next_run_time = Some(Utc::now());

        let this = Arc::clone(self);
        inner.timer = Some(tokio::spawn(async move { this.timer_loop().await }));
        info!(
            interval_minutes = self.config.interval_minutes,
            agents = self.registry.len(),
            "Scheduler started"
        );
        true
    }

    async fn timer_loop(self: Arc<Self>) {
        let _active = TimerGuard(&self);
        let ceiling = Duration::from_secs(MAX_INTERVAL_MINUTES * 60);
        let interval = self.config.interval();
        if interval > ceiling {
            warn!(
                interval_minutes = self.config.interval_minutes,
                max_interval_minutes = MAX_INTERVAL_MINUTES,
                "Interval above maximum, clamping"
            );
        }
        let interval = interval.min(ceiling);
        let mut deadline = Instant::now();

        loop {
            tokio::select! {
                biased;
                () = self.stop.cancelled() => break,
                () = tokio::time::sleep_until(deadline) => {}
            }

            // Cadence is measured from cycle start; an overrun leaves the
            // next deadline in the past so the following cycle starts at once.
            let tick = Instant::now();
            deadline = tick + interval;
            let next = chrono::Duration::from_std(interval)
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d));
            self.lock().next_run_time = next;

            let mut finished = self.cycles.subscribe();
            let claim = self.claim(&self.lock());
            let guard = match claim {
                Claim::Granted(guard) => guard,
                Claim::Busy => {
                    debug!("Cycle already in flight, timer tick deferred until it finishes");
                    match self.await_slot(&mut finished).await {
                        Some(guard) => guard,
                        None => break,
                    }
                }
                Claim::Stopped => break,
            };
            self.execute(guard, CycleTrigger::Timer, Uuid::new_v4(), false)
                .await;
        }
        debug!("Scheduler timer exited");
    }

    /// Wait for the in-flight cycle to finish, then claim the slot. `None`
    /// once the scheduler stops.
    async fn await_slot(
        &self,
        finished: &mut watch::Receiver<Option<CycleSummary>>,
    ) -> Option<CycleGuard> {
        loop {
            tokio::select! {
                biased;
                () = self.stop.cancelled() => return None,
                changed = finished.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
            let claim = self.claim(&self.lock());
            match claim {
                Claim::Granted(guard) => return Some(guard),
                Claim::Busy => {}
                Claim::Stopped => return None,
            }
        }
    }

    /// Manual trigger. Returns once the cycle has been dispatched, without
    /// waiting for it. Does not affect the timer cadence.
    pub fn trigger(self: &Arc<Self>) -> TriggerOutcome {
        // Held until the handle is registered so shutdown always awaits it
        let mut inner = self.lock();
        let guard = match self.claim(&inner) {
            Claim::Granted(guard) => guard,
            Claim::Busy => {
                drop(inner);
                info!("Cycle already in flight, manual trigger coalesced");
                return TriggerOutcome::Coalesced;
            }
            Claim::Stopped => return TriggerOutcome::Stopped,
        };

        let cycle_id = Uuid::new_v4();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.execute(guard, CycleTrigger::Manual, cycle_id, false)
                .await;
        });

        inner.manual.retain(|h| !h.is_finished());
        inner.manual.push(handle);
        TriggerOutcome::Started { cycle_id }
    }

    /// Run one cycle and wait for it. `None` when a cycle is already in
    /// flight or the scheduler is stopped.
    pub async fn run_cycle(&self, trigger: CycleTrigger, force: bool) -> Option<CycleSummary> {
        let claim = self.claim(&self.lock());
        let Claim::Granted(guard) = claim else {
            return None;
        };
        Some(self.execute(guard, trigger, Uuid::new_v4(), force).await)
    }

    /// Cancel the timer and refuse new cycles. In-flight runners finish.
    pub fn stop(&self) {
        let mut inner = self.lock();
        if inner.state == SchedulerState::Stopped {
            return;
        }
        inner.state = SchedulerState::Stopped;
        inner.timer_active = false;
        inner.next_run_time = None;
        drop(inner);
        self.stop.cancel();
        info!("Scheduler stopped");
    }

    /// Stop and also abandon in-flight detection attempts. Writes already
    /// under way still complete.
    pub fn hard_stop(&self) {
        self.stop();
        self.hard_stop.cancel();
        warn!("Scheduler hard stop requested");
    }

    /// Stop and wait for the timer and any manually triggered cycle to finish.
    pub async fn shutdown(&self) {
        self.stop();
        let handles: Vec<JoinHandle<()>> = {
            let mut inner = self.lock();
            inner.timer.take().into_iter().chain(inner.manual.drain(..)).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler task ended abnormally");
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        let inner = self.lock();
        SchedulerStatus {
            state: inner.state,
            is_running: inner.timer_active,
            interval_minutes: self.config.interval_minutes,
            last_run_time: inner.last_run_time,
            next_run_time: if inner.timer_active {
                inner.next_run_time
            } else {
                None
            },
            last_cycle: self.cycles.borrow().clone(),
            healthy: self.health.is_healthy(),
        }
    }

    /// Take the in-flight slot. Callers hold the state lock so `stop()`
    /// either refuses the claim or runs after it.
    fn claim(&self, inner: &Inner) -> Claim {
        if inner.state == SchedulerState::Stopped {
            return Claim::Stopped;
        }
        match self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => Claim::Granted(CycleGuard(Arc::clone(&self.in_flight))),
            Err(_) => Claim::Busy,
        }
    }

    /// Choose which agents run this cycle.
    ///
    /// Disabled agents never run. With `force` (or `force_all` configured)
    /// every other agent runs; otherwise each draws against its effective
    /// probability. Scenario generators are not biased by accuracy.
    pub fn select_agents(
        &self,
        records: &BTreeMap<AgentId, AgentRecord>,
        force: bool,
    ) -> Vec<Arc<dyn Agent>> {
        let force = force || self.config.force_all;
        self.registry
            .iter()
            .filter(|agent| {
                records
                    .get(agent.id())
                    .is_none_or(|r| r.state.is_dispatchable())
            })
            .filter(|agent| {
                if force {
                    return true;
                }
                let base = self.config.probability_for(agent.id());
                let p = match agent.kind() {
                    AgentKind::Detector if self.config.bias_by_accuracy => {
                        let accuracy = records
                            .get(agent.id())
                            .map_or_else(|| agent.initial_accuracy(), |r| r.accuracy);
                        effective_probability(base, accuracy, self.config.accuracy_floor)
                    }
                    _ => base.clamp(0.0, 1.0),
                };
                self.rng.with(|rng| rng.gen::<f64>() < p)
            })
            .cloned()
            .collect()
    }

    async fn load_records(&self) -> BTreeMap<AgentId, AgentRecord> {
        let seeded = self
            .registry
            .seed_records(self.stores.agents.as_ref())
            .await;
        self.health.observe(&seeded);
        match seeded {
            Ok(records) => records.into_iter().map(|r| (r.id.clone(), r)).collect(),
            Err(e) => {
                warn!(error = %e, "Agent records unavailable, using initial accuracy");
                BTreeMap::new()
            }
        }
    }

    async fn execute(
        &self,
        guard: CycleGuard,
        trigger: CycleTrigger,
        cycle_id: Uuid,
        force: bool,
    ) -> CycleSummary {
        let started_at = Utc::now();
        let clock = Instant::now();
        {
            let mut inner = self.lock();
            if inner.state != SchedulerState::Stopped {
                inner.state = SchedulerState::Running;
            }
            inner.last_run_time = Some(started_at);
        }

        let records = self.load_records().await;
        let selected = self.select_agents(&records, force);
        info!(
            cycle_id = %cycle_id,
            trigger = %trigger,
            selected = selected.len(),
            "Cycle started"
        );

        let ctx = DetectionContext {
            cycle_id,
            started_at,
            routes: Arc::clone(&self.routes),
            completion: Arc::clone(&self.completion),
        };

        let mut set = JoinSet::new();
        for agent in selected {
            let runner = Arc::clone(&self.runner);
            let ctx = ctx.clone();
            let hard_stop = self.hard_stop.clone();
            let kind = agent.kind();
            set.spawn(async move { (kind, runner.run(agent, &ctx, &hard_stop).await) });
        }

        let mut tally = Tally::default();
        let timed_out = match self.config.cycle_timeout() {
            Some(limit) => {
                let joined = tokio::time::timeout(limit, drain(&mut set, &mut tally)).await;
                if joined.is_err() {
                    warn!(
                        cycle_id = %cycle_id,
                        remaining = set.len(),
                        timeout_secs = limit.as_secs(),
                        "Cycle deadline expired, detaching remaining runners"
                    );
                    // Detached runners keep running so their writes complete
                    set.detach_all();
                }
                joined.is_err()
            }
            None => {
                drain(&mut set, &mut tally).await;
                false
            }
        };

        let finished_at = Utc::now();
        let summary = CycleSummary {
            cycle_id,
            trigger,
            started_at,
            finished_at,
            duration_ms: i64::try_from(clock.elapsed().as_millis()).unwrap_or(i64::MAX),
            agents_run: tally.agents_run,
            scenarios_run: tally.scenarios_run,
            failed_runs: tally.failed_runs,
            alerts_emitted: tally.alerts_emitted,
            alerts_suppressed: tally.alerts_suppressed,
            timed_out,
        };

        info!(
            cycle_id = %cycle_id,
            trigger = %trigger,
            agents_run = summary.agents_run,
            scenarios_run = summary.scenarios_run,
            failed_runs = summary.failed_runs,
            alerts_emitted = summary.alerts_emitted,
            alerts_suppressed = summary.alerts_suppressed,
            duration_ms = summary.duration_ms,
            timed_out,
            "Cycle finished"
        );

        {
            let mut inner = self.lock();
            if inner.state == SchedulerState::Running {
                inner.state = SchedulerState::Idle;
            }
        }
        // Free the slot before announcing so a deferred tick can claim it
        drop(guard);
        self.cycles.send_replace(Some(summary.clone()));
        summary
    }
}

async fn drain(set: &mut JoinSet<(AgentKind, RunReport)>, tally: &mut Tally) {
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((kind, report)) => tally.add(kind, &report),
            Err(e) => {
                error!(error = %e, panicked = e.is_panic(), "Runner task failed");
                tally.failed_runs += 1;
            }
        }
    }
}

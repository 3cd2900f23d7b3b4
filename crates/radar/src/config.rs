//! Engine configuration.
//!
//! Loaded from a TOML file; every field has a default so an empty file (or
//! no file at all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::model::AgentId;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    pub scheduler: SchedulerConfig,
    pub runner: RunnerConfig,
    pub dedup: DedupConfig,
    pub feedback: FeedbackConfig,
    pub health: HealthConfig,
    pub agents: AgentsConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
    /// Routes the detectors watch
    pub routes: Vec<String>,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            runner: RunnerConfig::default(),
            dedup: DedupConfig::default(),
            feedback: FeedbackConfig::default(),
            health: HealthConfig::default(),
            agents: AgentsConfig::default(),
            store: StoreConfig::default(),
            server: ServerConfig::default(),
            routes: default_routes(),
        }
    }
}

fn default_routes() -> Vec<String> {
    ["LHR-JFK", "LHR-DXB", "LHR-SIN", "LGW-BCN", "MAN-ORD"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl RadarConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        if config.routes.is_empty() {
            config.routes = default_routes();
        }
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        if self.runner.attempt_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "runner.attempt_timeout_secs must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.dedup.similarity_threshold) {
            return Err(ConfigError::Invalid(
                "dedup.similarity_threshold must be within [0, 1]".to_string(),
            ));
        }
        if !(1..=5).contains(&self.feedback.positive_threshold) {
            return Err(ConfigError::Invalid(
                "feedback.positive_threshold must be between 1 and 5".to_string(),
            ));
        }
        if self.feedback.window_days == 0 {
            return Err(ConfigError::Invalid(
                "feedback.window_days must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.agents.emit_probability) {
            return Err(ConfigError::Invalid(
                "agents.emit_probability must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scheduler cadence and dispatch probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Minutes between cycle starts, at most [`MAX_INTERVAL_MINUTES`]
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Upper bound on one cycle; `None` leaves cycles unbounded
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: Option<u64>,
    /// Scale dispatch probability by agent accuracy
    #[serde(default = "default_true")]
    pub bias_by_accuracy: bool,
    /// Fraction of the base probability kept at zero accuracy
    #[serde(default = "default_accuracy_floor")]
    pub accuracy_floor: f64,
    /// Dispatch every agent and scenario on every cycle
    #[serde(default)]
    pub force_all: bool,
    /// Probability for agents without an explicit entry
    #[serde(default = "default_probability")]
    pub default_probability: f64,
    /// Per-agent dispatch probability, keyed by agent id
    #[serde(default = "default_dispatch")]
    pub dispatch: BTreeMap<String, f64>,
}

/// One week.
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

fn default_interval_minutes() -> u64 {
    45
}
#[allow(clippy::unnecessary_wraps)]
fn default_cycle_timeout() -> Option<u64> {
    Some(600)
}
fn default_true() -> bool {
    true
}
fn default_accuracy_floor() -> f64 {
    0.25
}
fn default_probability() -> f64 {
    0.5
}
fn default_dispatch() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("competitive".to_string(), 0.7),
        ("performance".to_string(), 0.6),
        ("network".to_string(), 0.45),
        ("scenario-market".to_string(), 0.3),
        ("scenario-operations".to_string(), 0.2),
    ])
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            cycle_timeout_secs: default_cycle_timeout(),
            bias_by_accuracy: default_true(),
            accuracy_floor: default_accuracy_floor(),
            force_all: false,
            default_probability: default_probability(),
            dispatch: default_dispatch(),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    #[must_use]
    pub fn cycle_timeout(&self) -> Option<Duration> {
        self.cycle_timeout_secs.map(Duration::from_secs)
    }

    /// Base probability for an agent before any accuracy bias.
    #[must_use]
    pub fn probability_for(&self, id: &AgentId) -> f64 {
        self.dispatch
            .get(id.as_str())
            .copied()
            .unwrap_or(self.default_probability)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.interval_minutes must be positive".to_string(),
            ));
        }
        if self.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "scheduler.interval_minutes must be at most {MAX_INTERVAL_MINUTES}, got {}",
                self.interval_minutes
            )));
        }
        if !(0.0..=1.0).contains(&self.accuracy_floor) {
            return Err(ConfigError::Invalid(
                "scheduler.accuracy_floor must be within [0, 1]".to_string(),
            ));
        }
        let probabilities = self
            .dispatch
            .iter()
            .map(|(id, p)| (id.as_str(), *p))
            .chain(std::iter::once(("default_probability", self.default_probability)));
        for (id, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!(
                    "dispatch probability for {id} must be within [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }
}

/// Retry and timeout policy for one agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Additional attempts after the first
    pub max_retries: u32,
    pub attempt_timeout_secs: u64,
    /// Backoff unit; attempt `n` waits `n * base_delay_ms`
    pub base_delay_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            attempt_timeout_secs: 30,
            base_delay_ms: 2000,
        }
    }
}

/// Duplicate suppression window and threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub lookback_hours: u32,
    pub max_records: usize,
    /// Token-set similarity above which two alerts are the same situation
    pub similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 24,
            max_records: 200,
            similarity_threshold: 0.8,
        }
    }
}

/// Rolling accuracy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub window_days: u32,
    /// Ratings at or above this count as positive
    pub positive_threshold: u8,
    /// Feedback needed before a learning agent becomes active
    pub min_samples: usize,
    pub max_comment_len: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            positive_threshold: 4,
            min_samples: 5,
            max_comment_len: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive store failures before reporting unhealthy
    pub unhealthy_after: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { unhealthy_after: 3 }
    }
}

/// Simulation parameters for the built-in detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Chance that each detection slot yields a candidate
    pub emit_probability: f64,
    pub max_alerts_per_run: usize,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            emit_probability: 0.35,
            max_alerts_per_run: 2,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot of the in-memory store, saved after each cycle
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

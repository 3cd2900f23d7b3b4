//! Alert-generation core for an airline revenue-management dashboard.
//!
//! This crate provides:
//! - A scheduler that periodically runs analysis agents, biased towards the
//!   agents operators have found accurate
//! - A runner with bounded retry and per-attempt timeouts
//! - Duplicate suppression for candidate alerts
//! - A feedback ledger that keeps each agent's rolling accuracy
//! - Store traits with an in-memory implementation and JSON snapshots
//! - An axum router exposing trigger, status, feedback and read endpoints

pub mod agents;
pub mod api;
pub mod completion;
pub mod config;
pub mod dedup;
pub mod error;
pub mod feedback;
pub mod health;
pub mod model;
pub mod runner;
pub mod scheduler;
pub mod service;
pub mod store;

// Re-export main types
pub use agents::{Agent, AgentKind, AgentRegistry, DetectionContext};
pub use config::RadarConfig;
pub use dedup::{DedupDecision, DeduplicationFilter};
pub use error::{AgentError, FeedbackError, StoreError};
pub use feedback::{AccuracyUpdate, FeedbackLedger, FeedbackSubmission};
pub use health::HealthMonitor;
pub use runner::{AgentRunner, RunReport};
pub use scheduler::{CycleSummary, CycleTrigger, Scheduler, SchedulerStatus, TriggerOutcome};
pub use service::RadarService;
pub use store::{MemoryStore, Stores};

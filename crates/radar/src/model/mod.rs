//! Core data model: alerts, agents, execution records and feedback.

pub mod agent;
pub mod alert;
pub mod execution;
pub mod feedback;
pub mod metadata;

pub use agent::{AgentId, AgentRecord, AgentState};
pub use alert::{
    Alert, AlertId, AlertStatus, CandidateAlert, Category, Confidence, Priority,
};
pub use execution::{
    Activity, ActivityKind, ExecutionOutcome, ExecutionRecord, PendingExecution,
};
pub use feedback::{FeedbackEvent, Rating};
pub use metadata::{Metadata, MetadataValue};

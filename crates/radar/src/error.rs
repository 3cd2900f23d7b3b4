//! Error types for the alert engine.
//!
//! Each boundary gets its own enum so callers can tell a store outage apart
//! from a detector failure or a rejected feedback submission.

use thiserror::Error;

use crate::model::{AgentId, AlertId, AlertStatus};

/// Violations of data-model invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    /// Confidence outside `[0, 1]` or not a number
    #[error("confidence must be within [0, 1], got {0}")]
    ConfidenceOutOfRange(f64),

    /// Rating outside the accepted scale
    #[error("rating must be between {min} and {max}, got {value}")]
    RatingOutOfRange { value: i64, min: u8, max: u8 },

    /// Status change that would move an alert backwards
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: AlertStatus, to: AlertStatus },

    /// Unknown enumeration value
    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

/// Violations of the metadata size bounds.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("metadata map exceeds {max} entries")]
    TooManyEntries { max: usize },

    #[error("metadata key exceeds {max} characters: {key}")]
    KeyTooLong { key: String, max: usize },

    #[error("metadata text value exceeds {max} characters")]
    TextTooLong { max: usize },

    #[error("metadata nesting exceeds depth {max}")]
    TooDeep { max: usize },
}

/// Errors surfaced by the persistence collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the write
    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("alert not found: {0}")]
    AlertNotFound(AlertId),

    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error(transparent)]
    Model(#[from] ModelError),

    /// Snapshot file could not be read or written
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether this error means the store itself is unhealthy, as opposed to
    /// a request-level rejection.
    #[must_use]
    pub fn is_outage(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_))
    }
}

/// Errors returned by an agent's detection step.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A dependency the detector relies on failed
    #[error("detection dependency failed: {0}")]
    Dependency(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors from the AI completion capability.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion provider not configured")]
    NotConfigured,

    #[error("completion failed: {0}")]
    Failed(String),
}

/// Errors raised while ingesting operator feedback.
#[derive(Debug, Error)]
pub enum FeedbackError {
    /// Required field absent or empty
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("comment exceeds {max} characters")]
    CommentTooLong { max: usize },

    #[error(transparent)]
    Invalid(#[from] ModelError),

    #[error("alert not found: {0}")]
    UnknownAlert(AlertId),

    #[error("alert {alert_id} belongs to agent {actual}, not {claimed}")]
    AgentMismatch {
        alert_id: AlertId,
        claimed: AgentId,
        actual: AgentId,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

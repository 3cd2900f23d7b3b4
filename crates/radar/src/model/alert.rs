//! Alert records and the candidates agents propose.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::agent::AgentId;
use super::metadata::Metadata;
use crate::error::ModelError;

/// Opaque unique alert identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(Uuid);

impl AlertId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AlertId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Alert category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Competitor fare and capacity moves.
    Competitive,
    /// Route and flight revenue performance.
    Performance,
    /// Network connectivity and schedule disruption.
    Network,
    /// Anything else.
    Other,
}

impl Category {
    #[must_use]
    pub fn all() -> &'static [Category] {
        &[
            Category::Competitive,
            Category::Performance,
            Category::Network,
            Category::Other,
        ]
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Category::Competitive => "competitive",
            Category::Performance => "performance",
            Category::Network => "network",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "competitive" | "competitor" => Ok(Category::Competitive),
            "performance" | "perf" => Ok(Category::Performance),
            "network" => Ok(Category::Network),
            "other" => Ok(Category::Other),
            _ => Err(ModelError::UnknownVariant {
                kind: "category",
                value: s.to_string(),
            }),
        }
    }
}

/// Alert priority, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    #[must_use]
    pub fn all() -> &'static [Priority] {
        &[
            Priority::Critical,
            Priority::High,
            Priority::Medium,
            Priority::Low,
        ]
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(ModelError::UnknownVariant {
                kind: "priority",
                value: s.to_string(),
            }),
        }
    }
}

/// Detector confidence, guaranteed to lie within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    pub fn new(value: f64) -> Result<Self, ModelError> {
        if value.is_nan() || !(0.0..=1.0).contains(&value) {
            return Err(ModelError::ConfidenceOutOfRange(value));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = ModelError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(value: Confidence) -> Self {
        value.0
    }
}

/// Alert lifecycle status.
///
/// Transitions only move forward: `active -> acknowledged -> resolved`, with
/// `active -> resolved` allowed as a shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    const fn rank(self) -> u8 {
        match self {
            AlertStatus::Active => 0,
            AlertStatus::Acknowledged => 1,
            AlertStatus::Resolved => 2,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }

    #[must_use]
    pub const fn can_transition_to(self, next: AlertStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Validate a transition, returning the new status.
    pub fn transition(self, next: AlertStatus) -> Result<AlertStatus, ModelError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ModelError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AlertStatus::Active),
            "acknowledged" | "ack" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            _ => Err(ModelError::UnknownVariant {
                kind: "status",
                value: s.to_string(),
            }),
        }
    }
}

/// An unpersisted alert proposal returned by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAlert {
    pub category: Category,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    pub confidence: Confidence,
    #[serde(default)]
    pub metadata: Metadata,
}

impl CandidateAlert {
    pub fn new(
        category: Category,
        priority: Priority,
        title: impl Into<String>,
        description: impl Into<String>,
        confidence: Confidence,
    ) -> Self {
        Self {
            category,
            priority,
            title: title.into(),
            description: description.into(),
            route: None,
            confidence,
            metadata: Metadata::default(),
        }
    }

    #[must_use]
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A persisted alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub category: Category,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub agent_id: AgentId,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub status: AlertStatus,
}

impl Alert {
    /// Materialize an approved candidate as a new active alert.
    #[must_use]
    pub fn from_candidate(agent_id: AgentId, candidate: CandidateAlert) -> Self {
        let now = Utc::now();
        Self {
            id: AlertId::new(),
            created_at: now,
            updated_at: now,
            category: candidate.category,
            priority: candidate.priority,
            title: candidate.title,
            description: candidate.description,
            agent_id,
            confidence: candidate.confidence,
            route: candidate.route,
            metadata: candidate.metadata,
            status: AlertStatus::Active,
        }
    }

    /// Apply a status change, rejecting backwards moves.
    pub fn set_status(&mut self, next: AlertStatus) -> Result<(), ModelError> {
        self.status = self.status.transition(next)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

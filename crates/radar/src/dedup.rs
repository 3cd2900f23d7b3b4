//! Duplicate suppression for candidate alerts.
//!
//! A candidate is a duplicate when an active alert from the same agent and
//! category, for the same route, was created inside the lookback window and
//! either has the same normalized title or a near-identical wording.
//!
//! Deduplication is best-effort across runners executing concurrently: two
//! runners may both accept near-identical candidates in one cycle. Sequential
//! candidates from one runner are always checked against each other because
//! accepted candidates are persisted before the next one is checked.

use chrono::{Duration, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::config::DedupConfig;
use crate::error::StoreResult;
use crate::model::{AgentId, Alert, AlertId, AlertStatus, CandidateAlert};
use crate::store::{AlertFilter, AlertStore};

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]").expect("punctuation pattern is valid"));

/// Outcome of checking one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    Accept,
    Duplicate { existing: AlertId },
}

impl DedupDecision {
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, DedupDecision::Duplicate { .. })
    }
}

pub struct DeduplicationFilter {
    config: DedupConfig,
    alerts: Arc<dyn AlertStore>,
}

impl DeduplicationFilter {
    pub fn new(config: DedupConfig, alerts: Arc<dyn AlertStore>) -> Self {
        Self { config, alerts }
    }

    /// Compare a candidate against the agent's recent active alerts.
    ///
    /// A failed window lookup is returned to the caller, which decides
    /// whether to accept the candidate anyway.
    pub async fn check(
        &self,
        agent_id: &AgentId,
        candidate: &CandidateAlert,
    ) -> StoreResult<DedupDecision> {
        let filter = AlertFilter {
            agent_id: Some(agent_id.clone()),
            category: Some(candidate.category),
            status: Some(AlertStatus::Active),
            since: Some(Utc::now() - Duration::hours(i64::from(self.config.lookback_hours))),
        };
        let window = self
            .alerts
            .list_recent(&filter, self.config.max_records)
            .await?;

        let decision = decide(candidate, &window, self.config.similarity_threshold);
        if let DedupDecision::Duplicate { existing } = decision {
            debug!(
                agent_id = %agent_id,
                existing = %existing,
                title = %candidate.title,
                "Candidate matches recent alert"
            );
        }
        Ok(decision)
    }
}

/// Pure decision over an already-fetched window.
#[must_use]
pub fn decide(candidate: &CandidateAlert, window: &[Alert], threshold: f64) -> DedupDecision {
    let key = normalize_key(&candidate.title);
    let text = format!("{} {}", candidate.title, candidate.description);

    window
        .iter()
        .filter(|existing| routes_match(candidate.route.as_deref(), existing.route.as_deref()))
        .find(|existing| {
            normalize_key(&existing.title) == key
                || similarity(&text, &format!("{} {}", existing.title, existing.description))
                    > threshold
        })
        .map_or(DedupDecision::Accept, |existing| DedupDecision::Duplicate {
            existing: existing.id,
        })
}

/// Lowercase, strip punctuation and collapse whitespace.
#[must_use]
pub fn normalize_key(title: &str) -> String {
    PUNCTUATION
        .replace_all(&title.to_lowercase(), "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of the two texts' token sets, in `[0, 1]`.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = tokens(a);
    let b = tokens(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(&b).count();
    let total = a.union(&b).count();
    shared as f64 / total as f64
}

fn routes_match(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

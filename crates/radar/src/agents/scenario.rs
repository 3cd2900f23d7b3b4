//! Scenario generators.
//!
//! Emit pre-authored exemplar alerts so a fresh deployment shows realistic
//! traffic before the detectors have produced anything. They go through the
//! same runner, dedup and store path as every other agent.

use async_trait::async_trait;
use rand::seq::SliceRandom;

use super::{derive_seed, Agent, AgentKind, DetectionContext, SimRng};
use crate::error::AgentError;
use crate::model::{AgentId, CandidateAlert, Category, Confidence, Metadata, Priority};

/// A pre-authored alert.
#[derive(Debug, Clone)]
pub struct Exemplar {
    pub category: Category,
    pub priority: Priority,
    pub title: &'static str,
    pub description: &'static str,
    pub route: &'static str,
    pub confidence: f64,
    pub recommendation: &'static str,
}

impl Exemplar {
    fn to_candidate(&self, scenario: &str) -> Result<CandidateAlert, AgentError> {
        let metadata = Metadata::new()
            .with("route", self.route)?
            .with("scenario", scenario)?
            .with("recommendation", self.recommendation)?;
        Ok(CandidateAlert::new(
            self.category,
            self.priority,
            self.title,
            self.description,
            Confidence::new(self.confidence)?,
        )
        .with_route(self.route)
        .with_metadata(metadata))
    }
}

const MARKET_EXEMPLARS: &[Exemplar] = &[
    Exemplar {
        category: Category::Competitive,
        priority: Priority::Critical,
        title: "Fare war developing on LHR-JFK",
        description: "Two competitors have matched each other's cuts three times in 48 hours; lowest economy fare is down 28%.",
        route: "LHR-JFK",
        confidence: 0.91,
        recommendation: "Hold premium cabin fares, match only in the two lowest economy buckets.",
    },
    Exemplar {
        category: Category::Performance,
        priority: Priority::High,
        title: "Demand surge for LHR-DXB holiday period",
        description: "Bookings for the holiday departure week are running 34% ahead of last year with 60 days to go.",
        route: "LHR-DXB",
        confidence: 0.88,
        recommendation: "Close the lowest two fare buckets and raise group quotation floors.",
    },
    Exemplar {
        category: Category::Performance,
        priority: Priority::Medium,
        title: "Corporate share slipping on LHR-SIN",
        description: "Corporate bookings on LHR-SIN are down 9% month on month while leisure holds steady.",
        route: "LHR-SIN",
        confidence: 0.76,
        recommendation: "Review corporate deal compliance with the top ten accounts on the route.",
    },
];

const OPERATIONS_EXEMPLARS: &[Exemplar] = &[
    Exemplar {
        category: Category::Network,
        priority: Priority::High,
        title: "Weather disruption at LHR affecting transatlantic banks",
        description: "Fog programme at LHR is delaying the morning bank; 140 passengers at risk of missing onward connections.",
        route: "LHR-JFK",
        confidence: 0.84,
        recommendation: "Protect seats on the evening departures and pre-emptively rebook tight connections.",
    },
    Exemplar {
        category: Category::Network,
        priority: Priority::Medium,
        title: "Aircraft swap reduces capacity on MAN-ORD",
        description: "A 787-9 to 787-8 swap on MAN-ORD removes 38 seats for the next 5 departures.",
        route: "MAN-ORD",
        confidence: 0.8,
        recommendation: "Reduce overbooking limits and close discount economy on affected flights.",
    },
];

/// Agent that emits one exemplar per invocation.
pub struct ScenarioGenerator {
    id: AgentId,
    name: String,
    exemplars: Vec<Exemplar>,
    rng: SimRng,
}

impl ScenarioGenerator {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        exemplars: Vec<Exemplar>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            id: AgentId::new(id),
            name: name.into(),
            exemplars,
            rng: SimRng::new(seed),
        }
    }

    /// Built-in generators: market scenarios and operations scenarios.
    #[must_use]
    pub fn builtin(seed: Option<u64>) -> Vec<Self> {
        vec![
            Self::new(
                "scenario-market",
                "Market Scenarios",
                MARKET_EXEMPLARS.to_vec(),
                derive_seed(seed, 101),
            ),
            Self::new(
                "scenario-operations",
                "Operations Scenarios",
                OPERATIONS_EXEMPLARS.to_vec(),
                derive_seed(seed, 102),
            ),
        ]
    }
}

#[async_trait]
impl Agent for ScenarioGenerator {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Scenario
    }

    fn initial_accuracy(&self) -> f64 {
        100.0
    }

    async fn detect(&self, _ctx: &DetectionContext) -> Result<Vec<CandidateAlert>, AgentError> {
        let picked = self.rng.with(|rng| self.exemplars.choose(rng).cloned());
        match picked {
            Some(exemplar) => Ok(vec![exemplar.to_candidate(self.id.as_str())?]),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::DisabledCompletion;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_generator_emits_one_exemplar() {
        let generator = ScenarioGenerator::builtin(Some(5)).remove(0);
        let ctx = DetectionContext::new(Vec::<String>::new().into(), Arc::new(DisabledCompletion));
        let candidates = generator.detect(&ctx).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].metadata.get("scenario").and_then(|v| v.as_str()),
            Some("scenario-market")
        );
        assert_eq!(generator.kind(), AgentKind::Scenario);
    }

    #[tokio::test]
    async fn test_empty_generator_emits_nothing() {
        let generator = ScenarioGenerator::new("scenario-empty", "Empty", Vec::new(), None);
        let ctx = DetectionContext::new(Vec::<String>::new().into(), Arc::new(DisabledCompletion));
        assert!(generator.detect(&ctx).await.unwrap().is_empty());
    }

    #[test]
    fn test_exemplars_are_valid() {
        for exemplar in MARKET_EXEMPLARS.iter().chain(OPERATIONS_EXEMPLARS) {
            assert!(exemplar.to_candidate("test").is_ok(), "{}", exemplar.title);
        }
    }
}

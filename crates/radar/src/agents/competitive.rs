//! Competitive intelligence agent.
//!
//! Watches for competitor fare cuts and capacity additions on monitored
//! routes. Detection is simulated.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;

use super::{derive_seed, pick_route, Agent, DetectionContext, SimRng};
use crate::completion::recommend;
use crate::config::AgentsConfig;
use crate::error::AgentError;
use crate::model::{AgentId, CandidateAlert, Category, Confidence, Metadata, Priority};

const COMPETITORS: &[&str] = &[
    "Skyline Air",
    "Atlantic Connect",
    "EuroJet",
    "Gulf Horizon",
    "Northwind Airways",
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Move {
    /// Fare change in percent (negative)
    FareCut(f64),
    /// Weekly seats added
    CapacityAdd(u32),
}

#[derive(Debug, Clone)]
struct Signal {
    route: String,
    competitor: &'static str,
    movement: Move,
    confidence: f64,
}

pub struct CompetitiveAgent {
    id: AgentId,
    emit_probability: f64,
    max_alerts: usize,
    rng: SimRng,
}

impl CompetitiveAgent {
    pub const ID: &'static str = "competitive";

    #[must_use]
    pub fn new(config: &AgentsConfig) -> Self {
        Self {
            id: AgentId::new(Self::ID),
            emit_probability: config.emit_probability,
            max_alerts: config.max_alerts_per_run,
            rng: SimRng::new(derive_seed(config.seed, 1)),
        }
    }

    fn draw(&self, routes: &[String]) -> Vec<Signal> {
        self.rng.with(|rng| {
            let mut signals = Vec::new();
            for _ in 0..self.max_alerts {
                if !rng.gen_bool(self.emit_probability) {
                    continue;
                }
                let movement = if rng.gen_bool(0.7) {
                    Move::FareCut(-rng.gen_range(5.0..30.0_f64).round())
                } else {
                    Move::CapacityAdd(rng.gen_range(2..15_u32) * 180)
                };
                signals.push(Signal {
                    route: pick_route(rng, routes),
                    competitor: COMPETITORS
                        .choose(rng)
                        .copied()
                        .unwrap_or("Unknown carrier"),
                    movement,
                    confidence: rng.gen_range(0.65..0.95),
                });
            }
            signals
        })
    }
}

fn priority_for(movement: Move) -> Priority {
    match movement {
        Move::FareCut(pct) if pct <= -20.0 => Priority::Critical,
        Move::FareCut(pct) if pct <= -12.0 => Priority::High,
        Move::FareCut(_) => Priority::Medium,
        Move::CapacityAdd(seats) if seats >= 1800 => Priority::High,
        Move::CapacityAdd(_) => Priority::Medium,
    }
}

#[async_trait]
impl Agent for CompetitiveAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn name(&self) -> &str {
        "Competitive Intelligence"
    }

    fn initial_accuracy(&self) -> f64 {
        87.0
    }

    async fn detect(&self, ctx: &DetectionContext) -> Result<Vec<CandidateAlert>, AgentError> {
        let mut candidates = Vec::new();

        for signal in self.draw(&ctx.routes) {
            let (title, description, fallback, mut metadata) = match signal.movement {
                Move::FareCut(pct) => (
                    format!("{} cut fares {}% on {}", signal.competitor, pct.abs(), signal.route),
                    format!(
                        "{} reduced published fares on {} by {}% across economy buckets.",
                        signal.competitor,
                        signal.route,
                        pct.abs()
                    ),
                    "Review fare ladder and consider matching in the lowest open buckets.",
                    Metadata::new().with("fare_change_pct", pct)?,
                ),
                Move::CapacityAdd(seats) => (
                    format!("{} adding capacity on {}", signal.competitor, signal.route),
                    format!(
                        "{} filed {} additional weekly seats on {}.",
                        signal.competitor, seats, signal.route
                    ),
                    "Protect high-yield inventory and monitor booking pace for the affected weeks.",
                    Metadata::new().with("seats_added", i64::from(seats))?,
                ),
            };

            let prompt = format!(
                "You are an airline revenue analyst. {description} Give one concise pricing recommendation."
            );
            let recommendation = recommend(ctx.completion.as_ref(), &prompt, fallback).await;

            metadata.insert("route", signal.route.clone())?;
            metadata.insert("competitor", signal.competitor)?;
            metadata.insert("recommendation", recommendation)?;

            candidates.push(
                CandidateAlert::new(
                    Category::Competitive,
                    priority_for(signal.movement),
                    title,
                    description,
                    Confidence::new(signal.confidence)?,
                )
                .with_route(signal.route)
                .with_metadata(metadata),
            );
        }

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::StaticCompletion;
    use std::sync::Arc;

    #[test]
    fn test_priority_for_fare_cuts() {
        assert_eq!(priority_for(Move::FareCut(-25.0)), Priority::Critical);
        assert_eq!(priority_for(Move::FareCut(-15.0)), Priority::High);
        assert_eq!(priority_for(Move::FareCut(-6.0)), Priority::Medium);
        assert_eq!(priority_for(Move::CapacityAdd(2160)), Priority::High);
        assert_eq!(priority_for(Move::CapacityAdd(360)), Priority::Medium);
    }

    #[tokio::test]
    async fn test_zero_probability_emits_nothing() {
        let agent = CompetitiveAgent::new(&AgentsConfig {
            emit_probability: 0.0,
            max_alerts_per_run: 3,
            seed: Some(1),
        });
        let ctx = DetectionContext::new(
            vec!["LHR-JFK".to_string()].into(),
            Arc::new(StaticCompletion::new("n/a")),
        );
        assert!(agent.detect(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recommendation_comes_from_completion() {
        let agent = CompetitiveAgent::new(&AgentsConfig {
            emit_probability: 1.0,
            max_alerts_per_run: 1,
            seed: Some(3),
        });
        let ctx = DetectionContext::new(
            vec!["LHR-JFK".to_string()].into(),
            Arc::new(StaticCompletion::new("Match in Q and V classes.")),
        );
        let candidates = agent.detect(&ctx).await.unwrap();
        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert_eq!(candidate.category, Category::Competitive);
        assert_eq!(candidate.route.as_deref(), Some("LHR-JFK"));
        assert_eq!(
            candidate
                .metadata
                .get("recommendation")
                .and_then(|v| v.as_str()),
            Some("Match in Q and V classes.")
        );
    }
}

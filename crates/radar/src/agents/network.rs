//! Network agent.
//!
//! Flags hub misconnections and schedule disruptions that put connecting
//! revenue at risk.

use async_trait::async_trait;
use rand::Rng;

use super::{derive_seed, pick_route, Agent, DetectionContext, SimRng};
use crate::completion::recommend;
use crate::config::AgentsConfig;
use crate::error::AgentError;
use crate::model::{AgentId, CandidateAlert, Category, Confidence, Metadata, Priority};

#[derive(Debug, Clone)]
struct Disruption {
    route: String,
    hub: String,
    misconnecting_passengers: u32,
    revenue_at_risk: u32,
    confidence: f64,
}

pub struct NetworkAgent {
    id: AgentId,
    emit_probability: f64,
    max_alerts: usize,
    rng: SimRng,
}

impl NetworkAgent {
    pub const ID: &'static str = "network";

    #[must_use]
    pub fn new(config: &AgentsConfig) -> Self {
        Self {
            id: AgentId::new(Self::ID),
            emit_probability: config.emit_probability,
            max_alerts: config.max_alerts_per_run,
            rng: SimRng::new(derive_seed(config.seed, 3)),
        }
    }

    fn draw(&self, routes: &[String]) -> Vec<Disruption> {
        self.rng.with(|rng| {
            let mut found = Vec::new();
            for _ in 0..self.max_alerts {
                if !rng.gen_bool(self.emit_probability) {
                    continue;
                }
                let route = pick_route(rng, routes);
                let passengers = rng.gen_range(12..260_u32);
                found.push(Disruption {
                    hub: hub_of(&route),
                    route,
                    misconnecting_passengers: passengers,
                    revenue_at_risk: passengers * rng.gen_range(180..620_u32),
                    confidence: rng.gen_range(0.6..0.9),
                });
            }
            found
        })
    }
}

/// Origin airport of an `AAA-BBB` route code.
fn hub_of(route: &str) -> String {
    route.split('-').next().unwrap_or(route).to_string()
}

fn priority_for(misconnecting: u32) -> Priority {
    match misconnecting {
        150.. => Priority::Critical,
        80..=149 => Priority::High,
        30..=79 => Priority::Medium,
        _ => Priority::Low,
    }
}

#[async_trait]
impl Agent for NetworkAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn name(&self) -> &str {
        "Network Planning"
    }

    fn initial_accuracy(&self) -> f64 {
        78.0
    }

    async fn detect(&self, ctx: &DetectionContext) -> Result<Vec<CandidateAlert>, AgentError> {
        let mut candidates = Vec::new();

        for d in self.draw(&ctx.routes) {
            let title = format!("Misconnection risk at {} affecting {}", d.hub, d.route);
            let description = format!(
                "{} connecting passengers at {} are below minimum connect time; {} of revenue at risk.",
                d.misconnecting_passengers, d.hub, d.revenue_at_risk
            );
            let prompt = format!(
                "Hub {} disruption: {description} Recommend one re-accommodation or inventory action.",
                d.hub
            );
            let recommendation = recommend(
                ctx.completion.as_ref(),
                &prompt,
                "Protect onward inventory for affected passengers and alert hub control.",
            )
            .await;

            let metadata = Metadata::new()
                .with("route", d.route.clone())?
                .with("hub", d.hub.clone())?
                .with("misconnecting_passengers", i64::from(d.misconnecting_passengers))?
                .with("revenue_at_risk", i64::from(d.revenue_at_risk))?
                .with("recommendation", recommendation)?;

            candidates.push(
                CandidateAlert::new(
                    Category::Network,
                    priority_for(d.misconnecting_passengers),
                    title,
                    description,
                    Confidence::new(d.confidence)?,
                )
                .with_route(d.route)
                .with_metadata(metadata),
            );
        }

        Ok(candidates)
    }
}

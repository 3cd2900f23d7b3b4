//! Route performance agent.
//!
//! Compares simulated load factor and unit revenue against forecast and
//! raises alerts when a route drifts outside tolerance.

use async_trait::async_trait;
use rand::Rng;

use super::{derive_seed, pick_route, Agent, DetectionContext, SimRng};
use crate::completion::recommend;
use crate::config::AgentsConfig;
use crate::error::AgentError;
use crate::model::{AgentId, CandidateAlert, Category, Confidence, Metadata, Priority};

#[derive(Debug, Clone)]
struct Reading {
    route: String,
    forecast_load_factor: f64,
    actual_load_factor: f64,
    rask_change_pct: f64,
    confidence: f64,
}

impl Reading {
    fn gap(&self) -> f64 {
        self.actual_load_factor - self.forecast_load_factor
    }
}

pub struct PerformanceAgent {
    id: AgentId,
    emit_probability: f64,
    max_alerts: usize,
    rng: SimRng,
}

impl PerformanceAgent {
    pub const ID: &'static str = "performance";

    #[must_use]
    pub fn new(config: &AgentsConfig) -> Self {
        Self {
            id: AgentId::new(Self::ID),
            emit_probability: config.emit_probability,
            max_alerts: config.max_alerts_per_run,
            rng: SimRng::new(derive_seed(config.seed, 2)),
        }
    }

    fn draw(&self, routes: &[String]) -> Vec<Reading> {
        self.rng.with(|rng| {
            let mut readings = Vec::new();
            for _ in 0..self.max_alerts {
                if !rng.gen_bool(self.emit_probability) {
                    continue;
                }
                let forecast = rng.gen_range(72.0..90.0_f64).round();
                // Skew towards underperformance, which is what operators act on
                let gap = rng.gen_range(-22.0..8.0_f64).round();
                readings.push(Reading {
                    route: pick_route(rng, routes),
                    forecast_load_factor: forecast,
                    actual_load_factor: (forecast + gap).clamp(0.0, 100.0),
                    rask_change_pct: (gap * rng.gen_range(0.4..0.9)).round(),
                    confidence: rng.gen_range(0.7..0.97),
                });
            }
            readings
        })
    }
}

fn priority_for(gap: f64) -> Priority {
    match gap {
        g if g <= -15.0 => Priority::Critical,
        g if g <= -8.0 => Priority::High,
        g if g < 0.0 => Priority::Medium,
        _ => Priority::Low,
    }
}

#[async_trait]
impl Agent for PerformanceAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn name(&self) -> &str {
        "Route Performance"
    }

    fn initial_accuracy(&self) -> f64 {
        92.0
    }

    async fn detect(&self, ctx: &DetectionContext) -> Result<Vec<CandidateAlert>, AgentError> {
        let mut candidates = Vec::new();

        for reading in self.draw(&ctx.routes) {
            let gap = reading.gap();
            let (title, fallback) = if gap < 0.0 {
                (
                    format!("Load factor below forecast on {}", reading.route),
                    "Open lower fare buckets and review distribution for the next 21 days.",
                )
            } else {
                (
                    format!("Load factor ahead of forecast on {}", reading.route),
                    "Close discount buckets early to capture the demand upside.",
                )
            };
            let description = format!(
                "Load factor {}% against {}% forecast ({:+} pts), RASK {:+}% week on week.",
                reading.actual_load_factor,
                reading.forecast_load_factor,
                gap,
                reading.rask_change_pct
            );

            let prompt = format!(
                "Route {} performance: {description} Suggest one revenue management action.",
                reading.route
            );
            let recommendation = recommend(ctx.completion.as_ref(), &prompt, fallback).await;

            let metadata = Metadata::new()
                .with("route", reading.route.clone())?
                .with("forecast_load_factor", reading.forecast_load_factor)?
                .with("actual_load_factor", reading.actual_load_factor)?
                .with("rask_change_pct", reading.rask_change_pct)?
                .with("recommendation", recommendation)?;

            candidates.push(
                CandidateAlert::new(
                    Category::Performance,
                    priority_for(gap),
                    title,
                    description,
                    Confidence::new(reading.confidence)?,
                )
                .with_route(reading.route)
                .with_metadata(metadata),
            );
        }

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_for_gap() {
        assert_eq!(priority_for(-18.0), Priority::Critical);
        assert_eq!(priority_for(-9.0), Priority::High);
        assert_eq!(priority_for(-1.0), Priority::Medium);
        assert_eq!(priority_for(4.0), Priority::Low);
    }

    #[test]
    fn test_draw_keeps_load_factor_in_range() {
        let agent = PerformanceAgent::new(&AgentsConfig {
            emit_probability: 1.0,
            max_alerts_per_run: 50,
            seed: Some(11),
        });
        let readings = agent.draw(&["MAN-ORD".to_string()]);
        assert_eq!(readings.len(), 50);
        for r in readings {
            assert!((0.0..=100.0).contains(&r.actual_load_factor));
            assert_eq!(r.route, "MAN-ORD");
        }
    }
}

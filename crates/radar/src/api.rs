//! HTTP boundary.
//!
//! Exposes the scheduler, feedback ingestion and a read view of alerts and
//! agents:
//! - `POST /api/scheduler/trigger` - manual cycle trigger
//! - `GET  /api/scheduler/status`
//! - `POST /api/feedback`
//! - `GET  /api/alerts?status=&agent=&category=&limit=`
//! - `POST /api/alerts/{id}/status`
//! - `GET  /api/agents`
//! - `GET  /health`

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{FeedbackError, ModelError, StoreError};
use crate::feedback::FeedbackSubmission;
use crate::model::{AgentId, Alert, AlertId, AlertStatus, Category};
use crate::scheduler::TriggerOutcome;
use crate::service::RadarService;
use crate::store::AlertFilter;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

/// Error response body: `{ "error": "..." }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::AlertNotFound(_) | StoreError::AgentNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, err.to_string())
            }
            StoreError::Model(ModelError::InvalidTransition { .. }) => {
                Self::new(StatusCode::CONFLICT, err.to_string())
            }
            e if e.is_outage() => {
                error!(error = %e, "Store unavailable");
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
            }
            e => {
                error!(error = %e, "Store request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

impl From<FeedbackError> for ApiError {
    fn from(err: FeedbackError) -> Self {
        match err {
            FeedbackError::MissingField(_)
            | FeedbackError::InvalidField { .. }
            | FeedbackError::CommentTooLong { .. }
            | FeedbackError::Invalid(_) => Self::bad_request(err.to_string()),
            FeedbackError::UnknownAlert(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            FeedbackError::AgentMismatch { .. } => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            FeedbackError::Store(e) => e.into(),
        }
    }
}

/// Build the HTTP router.
pub fn build_router(service: RadarService) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/scheduler/trigger", post(trigger_handler))
        .route("/api/scheduler/status", get(status_handler))
        .route("/api/feedback", post(feedback_handler))
        .route("/api/alerts", get(list_alerts_handler))
        .route("/api/alerts/{id}/status", post(update_status_handler))
        .route("/api/agents", get(list_agents_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve until `shutdown` resolves.
pub async fn run_server(
    service: RadarService,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_router(service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Radar API listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AlertQuery {
    status: Option<String>,
    agent: Option<String>,
    category: Option<String>,
    limit: Option<usize>,
}

impl AlertQuery {
    fn into_filter(self) -> Result<(AlertFilter, usize), ApiError> {
        let parse_err = |e: ModelError| ApiError::bad_request(e.to_string());
        let filter = AlertFilter {
            agent_id: self.agent.filter(|a| !a.is_empty()).map(AgentId::new),
            category: self
                .category
                .map(|c| c.parse::<Category>())
                .transpose()
                .map_err(parse_err)?,
            status: self
                .status
                .map(|s| s.parse::<AlertStatus>())
                .transpose()
                .map_err(parse_err)?,
            since: None,
        };
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        Ok((filter, limit))
    }
}

#[derive(Debug, Deserialize)]
struct StatusChange {
    status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertList {
    count: usize,
    alerts: Vec<Alert>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler(State(service): State<RadarService>) -> impl IntoResponse {
    let report = service.health.report();
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if report.healthy { "healthy" } else { "unhealthy" },
            "version": env!("CARGO_PKG_VERSION"),
            "store": report,
        })),
    )
}

async fn trigger_handler(State(service): State<RadarService>) -> impl IntoResponse {
    let outcome = service.scheduler.trigger();
    info!(?outcome, "Manual trigger requested");
    let status = match outcome {
        TriggerOutcome::Started { .. } | TriggerOutcome::Coalesced => StatusCode::ACCEPTED,
        TriggerOutcome::Stopped => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(outcome))
}

async fn status_handler(State(service): State<RadarService>) -> impl IntoResponse {
    Json(service.scheduler.status())
}

async fn feedback_handler(
    State(service): State<RadarService>,
    body: Result<Json<FeedbackSubmission>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(submission) = body.map_err(|e| {
        warn!(error = %e, "Malformed feedback body");
        ApiError::bad_request(e.body_text())
    })?;
    let update = service.ledger.submit(submission).await?;
    Ok((StatusCode::CREATED, Json(update)))
}

async fn list_alerts_handler(
    State(service): State<RadarService>,
    Query(query): Query<AlertQuery>,
) -> Result<Json<AlertList>, ApiError> {
    let (filter, limit) = query.into_filter()?;
    let result = service.stores.alerts.list_recent(&filter, limit).await;
    service.health.observe(&result);
    let alerts = result?;
    Ok(Json(AlertList {
        count: alerts.len(),
        alerts,
    }))
}

async fn update_status_handler(
    State(service): State<RadarService>,
    Path(id): Path<String>,
    body: Result<Json<StatusChange>, JsonRejection>,
) -> Result<Json<Alert>, ApiError> {
    let id: AlertId = id
        .parse()
        .map_err(|e: uuid::Error| ApiError::bad_request(format!("invalid alert id: {e}")))?;
    let Json(change) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let status: AlertStatus = change
        .status
        .parse()
        .map_err(|e: ModelError| ApiError::bad_request(e.to_string()))?;

    let result = service.stores.alerts.update_status(&id, status).await;
    service.health.observe(&result);
    let alert = result?;
    info!(alert_id = %id, status = %alert.status, "Alert status changed");
    Ok(Json(alert))
}

async fn list_agents_handler(
    State(service): State<RadarService>,
) -> Result<impl IntoResponse, ApiError> {
    let result = service.stores.agents.list_agents().await;
    service.health.observe(&result);
    Ok(Json(result?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RadarConfig;
    use crate::model::{CandidateAlert, Confidence, Priority};
    use crate::store::Stores;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn service() -> RadarService {
        let mut config = RadarConfig::load_or_default(None).unwrap();
        config.agents.seed = Some(1);
        let service = RadarService::builtin(config, Stores::in_memory());
        service.bootstrap().await.unwrap();
        service
    }

    async fn seed_alert(service: &RadarService) -> AlertId {
        let alert = Alert::from_candidate(
            AgentId::new("competitive"),
            CandidateAlert::new(
                Category::Competitive,
                Priority::High,
                "EuroJet cut fares 15% on LGW-BCN",
                "EuroJet reduced published fares",
                Confidence::new(0.82).unwrap(),
            )
            .with_route("LGW-BCN"),
        );
        service.stores.alerts.create(alert).await.unwrap()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_ok() {
        let router = build_router(service().await);
        let (status, body) = send(router, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_status_shape() {
        let router = build_router(service().await);
        let (status, body) = send(
            router,
            Request::get("/api/scheduler/status").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isRunning"], false);
        assert_eq!(body["intervalMinutes"], 45);
        assert_eq!(body["state"], "idle");
        assert!(body["lastRunTime"].is_null());
        assert!(body["nextRunTime"].is_null());
    }

    #[tokio::test]
    async fn test_trigger_accepted() {
        let router = build_router(service().await);
        let (status, body) = send(
            router,
            Request::post("/api/scheduler/trigger").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["outcome"], "started");
    }

    #[tokio::test]
    async fn test_feedback_status_codes() {
        let service = service().await;
        let alert_id = seed_alert(&service).await;
        let router = build_router(service);

        let ok = json!({ "alertId": alert_id.to_string(), "agentId": "competitive", "rating": 5 });
        let (status, body) = send(router.clone(), post_json("/api/feedback", &ok)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["samples"], 1);
        assert_eq!(body["current"], 100.0);

        let missing = json!({ "agentId": "competitive", "rating": 5 });
        let (status, body) = send(router.clone(), post_json("/api/feedback", &missing)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("alertId"));

        let out_of_range = json!({ "alertId": alert_id.to_string(), "agentId": "competitive", "rating": 7 });
        let (status, _) = send(router.clone(), post_json("/api/feedback", &out_of_range)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unknown = json!({ "alertId": AlertId::new().to_string(), "agentId": "competitive", "rating": 3 });
        let (status, _) = send(router.clone(), post_json("/api/feedback", &unknown)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let mismatch = json!({ "alertId": alert_id.to_string(), "agentId": "network", "rating": 3 });
        let (status, _) = send(router.clone(), post_json("/api/feedback", &mismatch)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let request = Request::post("/api/feedback")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_alert_status_transitions() {
        let service = service().await;
        let alert_id = seed_alert(&service).await;
        let router = build_router(service);
        let uri = format!("/api/alerts/{alert_id}/status");

        let (status, body) = send(router.clone(), post_json(&uri, &json!({ "status": "acknowledged" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "acknowledged");

        let (status, _) = send(router.clone(), post_json(&uri, &json!({ "status": "resolved" }))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(router.clone(), post_json(&uri, &json!({ "status": "active" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());

        let missing = format!("/api/alerts/{}/status", AlertId::new());
        let (status, _) = send(router.clone(), post_json(&missing, &json!({ "status": "resolved" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(router, post_json("/api/alerts/nope/status", &json!({ "status": "resolved" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_alerts_and_agents() {
        let service = service().await;
        seed_alert(&service).await;
        let router = build_router(service);

        let (status, body) = send(
            router.clone(),
            Request::get("/api/alerts?category=competitive&status=active&limit=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["alerts"][0]["route"], "LGW-BCN");

        let (status, body) = send(
            router.clone(),
            Request::get("/api/alerts?agent=network").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);

        let (status, _) = send(
            router.clone(),
            Request::get("/api/alerts?category=weather").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(router, Request::get("/api/agents").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 5);
    }
}

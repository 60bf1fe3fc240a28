//! Web server module.
//!
//! Serves the Prometheus exposition endpoint, health checks and a JSON view
//! of the collection jobs.

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::engine::{JobBoard, JobInfo};
use crate::metrics::{MetricRegistry, TEXT_CONTENT_TYPE};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<MetricRegistry>,
    pub jobs: JobBoard,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending_jobs: Option<Vec<String>>,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/api/jobs", get(jobs_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .with_state(app_state)
}

/// Prometheus scrape endpoint.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.registry.render() {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)], body).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Metrics render failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Liveness check.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        pending_jobs: None,
    })
}

/// Readiness check: ready once every job has completed a cycle.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    let pending: Vec<String> = state
        .jobs
        .list()
        .into_iter()
        .filter(|info| info.cycles == 0)
        .map(|info| info.name)
        .collect();

    if pending.is_empty() {
        Json(HealthResponse {
            status: "ok".to_string(),
            pending_jobs: None,
        })
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "not_ready".to_string(),
                pending_jobs: Some(pending),
            }),
        )
            .into_response()
    }
}

/// Job states as JSON.
async fn jobs_handler(State(state): State<Arc<AppState>>) -> Json<Vec<JobInfo>> {
    Json(state.jobs.list())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::config::{MetricConfig, MetricKind, QueryConfig};
    use crate::engine::CollectionOutcome;
    use crate::metrics::MetricUpdate;

    fn state() -> AppState {
        AppState {
            registry: Arc::new(MetricRegistry::new()),
            jobs: JobBoard::new(),
        }
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = state();
        let def = MetricConfig::new("app_users", "Active users", MetricKind::Gauge);
        state.registry.get_or_create(&def).unwrap();
        state
            .registry
            .apply(&MetricUpdate {
                metric: "app_users".to_string(),
                labels: vec![],
                value: 42.0,
                kind: MetricKind::Gauge,
            })
            .unwrap();

        let (status, content_type, body) = get(create_router(state), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/plain; version=0.0.4"));
        assert!(body.contains("app_users 42"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint_empty_registry() {
        let (status, _, body) = get(create_router(state()), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_healthz() {
        let (status, _, body) = get(create_router(state()), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_readyz_waits_for_first_cycle() {
        let state = state();
        state.jobs.register(&QueryConfig::new("q", "db", "SELECT 1"));

        let (status, _, body) = get(create_router(state.clone()), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["pending_jobs"][0], "q");

        state.jobs.record_cycle(
            "q",
            Utc::now(),
            Duration::from_millis(5),
            &CollectionOutcome::Success { rows: 1, updates: 1 },
        );
        let (status, _, _) = get(create_router(state), "/readyz").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_jobs_endpoint() {
        let state = state();
        state.jobs.register(&QueryConfig::new("b", "db", "SELECT 1"));
        state.jobs.register(&QueryConfig::new("a", "db", "SELECT 1"));

        let (status, _, body) = get(create_router(state), "/api/jobs").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json[0]["name"], "a");
        assert_eq!(json[1]["name"], "b");
        assert_eq!(json[0]["state"], "idle");
        assert_eq!(json[0]["cycles"], 0);
    }
}

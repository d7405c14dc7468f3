//! Health check endpoints.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::AppState;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check response.
#[derive(Debug, Serialize)]
struct ReadinessResponse {
    status: &'static str,
    backends: BackendStatus,
}

#[derive(Debug, Serialize)]
struct BackendStatus {
    redis: bool,
    local_inference: bool,
}

/// Readiness check.
///
/// Reports which optional backends are wired in. The service is ready even
/// without them; everything degrades to in-memory or cloud-only operation.
async fn readiness_check(State(state): State<AppState>) -> Json<ReadinessResponse> {
    Json(ReadinessResponse {
        status: "ready",
        backends: BackendStatus {
            redis: state.redis_connected,
            local_inference: state.config.local.enabled,
        },
    })
}

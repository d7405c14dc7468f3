//! Operator statistics endpoints.
//!
//! Read-only snapshots of the ingestion and routing counters, plus an
//! explicit reset for the processing counters. Resetting is an operator
//! action; nothing in the pipeline resets counters on its own.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;

use crate::AppState;
use crate::ai::RoutingMetricsSnapshot;
use crate::ingest::ProcessingStatsSnapshot;

/// Create the stats router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/stats/reset", post(reset_stats))
}

/// Combined statistics response.
#[derive(Debug, Serialize)]
struct StatsResponse {
    processing: ProcessingStatsSnapshot,
    routing: RoutingMetricsSnapshot,
    circuit_state: &'static str,
}

/// Point-in-time snapshot of all service counters.
async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        processing: state.processing_stats.snapshot(),
        routing: state.routing_metrics.snapshot(),
        circuit_state: state.router.breaker().state().as_str(),
    })
}

/// Reset response.
#[derive(Debug, Serialize)]
struct ResetResponse {
    reset: bool,
}

/// Zero the processing counters.
async fn reset_stats(State(state): State<AppState>) -> Json<ResetResponse> {
    state.processing_stats.reset();
    tracing::info!("Processing statistics reset by operator");
    Json(ResetResponse { reset: true })
}

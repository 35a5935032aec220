//! Liveness, readiness and metrics endpoints.

use crate::server::state::AppState;
use axum::{Json, extract::State, response::Response};
use eventhub_web::handlers::{HealthResponse, ReadinessReport, health_check, render_metrics};

const SERVICE: &str = "vendors";

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    health_check(SERVICE)
}

/// `GET /ready`: the vendors database answers and the sync consumer runs.
pub async fn ready(State(state): State<AppState>) -> ReadinessReport {
    let database = state.vendors.ping().await;
    ReadinessReport::new(SERVICE)
        .check(
            "database",
            database.is_ok(),
            database.err().map_or_else(|| "ok".to_string(), |e| e.to_string()),
        )
        .check("vendor_sync", state.sync.is_running(), state.sync.state().as_str())
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> Response {
    render_metrics(&state.metrics)
}

//! Liveness, readiness and metrics endpoints.

use crate::server::state::AppState;
use axum::{Json, extract::State, response::Response};
use eventhub_web::handlers::{HealthResponse, ReadinessReport, health_check, render_metrics};

const SERVICE: &str = "auth";

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    health_check(SERVICE)
}

/// `GET /ready`: the users database answers and every background
/// component is running.
pub async fn ready(State(state): State<AppState>) -> ReadinessReport {
    let database = state.users.ping().await;
    let mut report = ReadinessReport::new(SERVICE).check(
        "database",
        database.is_ok(),
        database.err().map_or_else(|| "ok".to_string(), |e| e.to_string()),
    );

    for (name, lifecycle) in &state.components {
        report = report.check(*name, lifecycle.is_running(), lifecycle.state().as_str());
    }
    report
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> Response {
    render_metrics(&state.metrics)
}

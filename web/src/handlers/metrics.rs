//! Prometheus exposition.

use axum::{
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use eventhub_runtime::metrics::MetricsServer;

/// Render `server` as a `/metrics` response.
///
/// Answers 503 when this process did not install the recorder.
pub fn render_metrics(server: &MetricsServer) -> Response {
    server.render().map_or_else(
        || (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
        |body| {
            (
                StatusCode::OK,
                [(CONTENT_TYPE, "text/plain; version=0.0.4")],
                body,
            )
                .into_response()
        },
    )
}

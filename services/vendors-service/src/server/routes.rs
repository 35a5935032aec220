//! HTTP route configuration.

use crate::api::{dead_letters, vendors};
use crate::server::health::{health, metrics, ready};
use crate::server::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use eventhub_web::correlation_id_layer;
use tower_http::trace::TraceLayer;

/// Build the complete application router.
///
/// # Routes
///
/// - `GET /health`, `GET /ready`, `GET /metrics`
/// - `GET /api/vendors/ping`
/// - `GET|POST /api/vendors`, `GET /api/vendors/me`
/// - `GET|PUT|DELETE /api/vendors/:id`
/// - `GET /api/admin/dead-letters`
/// - `POST /api/admin/dead-letters/:id/replay`, `POST /api/admin/dead-letters/:id/discard`
pub fn build_router(state: AppState) -> Router {
    let vendor_routes = Router::new()
        .route("/", get(vendors::list).post(vendors::create))
        .route("/ping", get(vendors::ping))
        .route("/me", get(vendors::me))
        .route(
            "/:id",
            get(vendors::get).put(vendors::update).delete(vendors::delete),
        );

    let admin_routes = Router::new()
        .route("/dead-letters", get(dead_letters::list))
        .route("/dead-letters/:id/replay", post(dead_letters::replay))
        .route("/dead-letters/:id/discard", post(dead_letters::discard));

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .nest("/api/vendors", vendor_routes)
        .nest("/api/admin", admin_routes)
        .layer(correlation_id_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

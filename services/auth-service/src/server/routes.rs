//! HTTP route configuration.

use crate::api::{auth, users};
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
/// - `POST /v1/auth/register`, `POST /v1/auth/login`, `GET /v1/auth/me`
/// - `GET /v1/auth/users/search?email=`
/// - `GET /v1/users/:id`
pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/users/search", get(users::search_by_email));

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/v1/users/:id", get(users::get_user))
        .nest("/v1/auth", auth_routes)
        .layer(correlation_id_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

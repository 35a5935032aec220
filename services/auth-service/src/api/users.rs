//! Internal user lookups.
//!
//! - GET /v1/users/:id
//! - GET /v1/auth/users/search?email=

use crate::api::UserResponse;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use eventhub_core::identity::UserId;
use eventhub_web::AppError;
use serde::Deserialize;

/// Query parameters for the email search.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Exact email to look up
    pub email: String,
}

/// Look a user up by id.
///
/// # Errors
///
/// 404 if no user has this id.
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("User", id))?;
    Ok(Json(UserResponse::from(&user)))
}

/// Look a user up by email.
///
/// # Errors
///
/// 404 if no user has this email.
pub async fn search_by_email(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<UserResponse>, AppError> {
    let email = query.email.trim();
    let user = state
        .users
        .find_by_email(email)
        .await?
        .ok_or_else(|| AppError::not_found("User", email))?;
    Ok(Json(UserResponse::from(&user)))
}

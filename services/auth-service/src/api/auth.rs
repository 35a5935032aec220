//! Authentication API endpoints.
//!
//! - POST /v1/auth/register - Create a user (vendors are announced on the bus)
//! - POST /v1/auth/login - Exchange credentials for an access token
//! - GET /v1/auth/me - The caller's profile

use crate::api::UserResponse;
use crate::registration::{Registration, RegistrationError};
use crate::server::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use eventhub_core::identity::Role;
use eventhub_web::{AppError, CurrentUser};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to register a user.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Login email
    pub email: String,
    /// Password, at least six characters
    pub password: String,
    /// Role; defaults to `attendee`
    #[serde(default)]
    pub role: Option<Role>,
}

/// Login credentials.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Login email
    pub email: String,
    /// Password
    pub password: String,
}

/// Issued access token.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// HS256 JWT
    pub token: String,
    /// Always `bearer`
    pub token_type: &'static str,
    /// Lifetime in seconds
    pub expires_in: i64,
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Validation(message) => Self::validation(message),
            RegistrationError::DuplicateEmail => Self::conflict("Email already registered"),
            RegistrationError::Auth(e) => e.into(),
            RegistrationError::Store(e) => e.into(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Register a user.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8001/v1/auth/register \
///   -H "Content-Type: application/json" \
///   -d '{"email": "v@test.com", "password": "secret123", "role": "vendor"}'
/// # {"id":42,"email":"v@test.com","role":"vendor"}
/// ```
///
/// # Errors
///
/// 422 on validation failure, 409 if the email is taken.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let user = state
        .registration
        .register(Registration {
            email: request.email,
            password: request.password,
            role: request.role,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// Log in.
///
/// # Errors
///
/// 401 on unknown email or wrong password.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let (_user, token) = state.registration.login(&request.email, &request.password).await?;
    Ok(Json(TokenResponse {
        token,
        token_type: "bearer",
        expires_in: state.keys.ttl().num_seconds(),
    }))
}

/// The caller's profile.
///
/// # Errors
///
/// 401 without a valid token, 404 if the user no longer exists.
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<UserResponse>, AppError> {
    let id = claims.user_id()?;
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("User", id))?;
    Ok(Json(UserResponse::from(&user)))
}

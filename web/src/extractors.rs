//! Custom Axum extractors.
//!
//! - [`CorrelationId`]: the request's correlation id
//! - [`BearerToken`]: the raw `Authorization: Bearer …` token
//! - [`CurrentUser`]: verified token claims
//!
//! [`CurrentUser`] needs the verification keys from state: any state `S`
//! with `Arc<JwtKeys>: FromRef<S>` works.
//!
//! ```ignore
//! async fn me(CurrentUser(claims): CurrentUser) -> Json<Me> {
//!     Json(Me { id: claims.sub, role: claims.role })
//! }
//! ```

use crate::error::AppError;
use crate::middleware::correlation_id_from;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use eventhub_auth::{AuthError, Claims, JwtKeys};
use std::sync::Arc;
use uuid::Uuid;

/// Correlation ID for request tracing.
///
/// Reads the id stored by the correlation middleware, falling back to the
/// header (or a fresh id) on routers without it.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .extensions
            .get::<Uuid>()
            .copied()
            .unwrap_or_else(|| correlation_id_from(&parts.headers));
        Ok(Self(id))
    }
}

/// Raw bearer token from the `Authorization` header.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl BearerToken {
    fn from_parts(parts: &Parts) -> Result<Self, AuthError> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingToken)?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::InvalidToken {
                reason: "expected a Bearer token".to_string(),
            })?;

        Ok(Self(token.to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts)?)
    }
}

/// Claims of a verified access token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    Arc<JwtKeys>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_parts(parts)?;
        let keys = Arc::<JwtKeys>::from_ref(state);

        let claims = keys.verify(&token).inspect_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
        })?;
        Ok(Self(claims))
    }
}

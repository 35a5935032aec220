//! Axum integration shared by the eventhub services.
//!
//! # Request Flow
//!
//! 1. **Correlation** id attached by [`middleware::correlation_id_layer`]
//! 2. **Authenticate** with [`extractors::CurrentUser`] (bearer JWT)
//! 3. **Authorize** once with `eventhub_auth::authorize`
//! 4. **Call** the store port
//! 5. **Map** domain errors to HTTP through [`AppError`]
//!
//! # Example
//!
//! ```ignore
//! use eventhub_web::{AppError, CurrentUser};
//! use eventhub_auth::{Operation, authorize};
//!
//! async fn delete_vendor(
//!     State(state): State<AppState>,
//!     CurrentUser(claims): CurrentUser,
//!     Path(id): Path<i64>,
//! ) -> Result<StatusCode, AppError> {
//!     authorize(claims.role, Operation::DeleteVendor)?;
//!     if !state.vendors.delete(id).await? {
//!         return Err(AppError::not_found("Vendor", id));
//!     }
//!     Ok(StatusCode::NO_CONTENT)
//! }
//! ```

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{BearerToken, CorrelationId, CurrentUser};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

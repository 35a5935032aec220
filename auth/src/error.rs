//! Error types for authentication and authorization operations.

use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Failure modes of the auth primitives, grouped by who is at fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Authentication Errors
    // ═══════════════════════════════════════════════════════════

    /// Email/password pair does not match a user.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// No bearer token on the request.
    #[error("Missing bearer token")]
    MissingToken,

    /// Token is malformed, has a bad signature, or carries bad claims.
    #[error("Invalid token: {reason}")]
    InvalidToken {
        /// Reason for rejection
        reason: String,
    },

    /// Token is past its `exp`.
    #[error("Token has expired")]
    TokenExpired,

    // ═══════════════════════════════════════════════════════════
    // Authorization Errors
    // ═══════════════════════════════════════════════════════════

    /// The caller's role may not perform the operation at all, or not on
    /// this record.
    #[error("Insufficient permissions: {required}")]
    InsufficientPermissions {
        /// Operation that was refused
        required: String,
    },

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Hashing or token signing failed.
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl AuthError {
    /// Returns `true` if this error is due to the caller's credentials
    /// (maps to 401).
    ///
    /// # Examples
    ///
    /// ```
    /// # use eventhub_auth::AuthError;
    /// assert!(AuthError::TokenExpired.is_unauthenticated());
    /// assert!(!AuthError::Crypto("boom".into()).is_unauthenticated());
    /// ```
    #[must_use]
    pub const fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials | Self::MissingToken | Self::InvalidToken { .. } | Self::TokenExpired
        )
    }
}

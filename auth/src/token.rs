//! HS256 access tokens.
//!
//! A token carries `sub` (the user id in decimal), `email`, `role`, `iat` and
//! `exp`. Services that only check tokens need the shared secret and nothing
//! else: no call back to the identity service.

use crate::error::{AuthError, Result};
use chrono::{DateTime, Duration, Utc};
use eventhub_core::identity::{Role, User, UserId};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 24 * 60;

/// Claims of an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id, in decimal.
    pub sub: String,
    /// Email at issue time.
    pub email: String,
    /// Role at issue time.
    pub role: Role,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

impl Claims {
    /// The subject as a numeric user id.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if `sub` is not an integer.
    pub fn user_id(&self) -> Result<UserId> {
        self.sub.parse().map_err(|_| AuthError::InvalidToken {
            reason: format!("subject is not a user id: {}", self.sub),
        })
    }
}

/// Signing and verification keys derived from one shared secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtKeys")
            .field("ttl_minutes", &self.ttl.num_minutes())
            .finish_non_exhaustive()
    }
}

impl JwtKeys {
    /// Keys for `secret`, issuing tokens valid for `ttl_minutes`.
    #[must_use]
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Lifetime of issued tokens.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `user`, valid from now.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Crypto` if signing fails.
    pub fn issue(&self, user: &User) -> Result<String> {
        self.issue_at(user, Utc::now())
    }

    /// Issue a token for `user` as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Crypto` if signing fails.
    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Crypto(e.to_string()))
    }

    /// Check signature and expiry and return the claims.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenExpired` for an expired token and
    /// `AuthError::InvalidToken` for anything else that fails validation,
    /// including an unknown role.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken { reason: e.to_string() },
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User {
            id: 42,
            email: "v@test.com".into(),
            password_hash: String::new(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_verifies() {
        let keys = JwtKeys::new("secret", DEFAULT_TOKEN_TTL_MINUTES);
        let token = keys.issue(&user(Role::Vendor)).unwrap();

        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.role, Role::Vendor);
        assert_eq!(claims.exp - claims.iat, DEFAULT_TOKEN_TTL_MINUTES * 60);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = JwtKeys::new("secret", 60).issue(&user(Role::Admin)).unwrap();
        let err = JwtKeys::new("other", 60).verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken { .. }));
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = JwtKeys::new("secret", 60);
        let token = keys
            .issue_at(&user(Role::Admin), Utc::now() - Duration::hours(3))
            .unwrap();
        assert_eq!(keys.verify(&token).unwrap_err(), AuthError::TokenExpired);
    }

    #[test]
    fn garbage_is_rejected() {
        let keys = JwtKeys::new("secret", 60);
        assert!(matches!(
            keys.verify("not.a.token"),
            Err(AuthError::InvalidToken { .. })
        ));
    }
}

//! Users, roles and the identity store port.

use crate::outbox::OutboxMessage;
use crate::store::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identity-service user id.
pub type UserId = i64;

/// Closed set of roles a user can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access.
    Admin,
    /// Runs events and pre-registers vendors.
    Organizer,
    /// Sells at events; owns one vendor record.
    Vendor,
    /// Default role.
    #[default]
    Attendee,
}

/// A role string that is not one of the known roles.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl Role {
    /// Every role, in privilege order.
    pub const ALL: [Self; 4] = [Self::Admin, Self::Organizer, Self::Vendor, Self::Attendee];

    /// Database and token representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Organizer => "organizer",
            Self::Vendor => "vendor",
            Self::Attendee => "attendee",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "organizer" => Ok(Self::Organizer),
            "vendor" => Ok(Self::Vendor),
            "attendee" => Ok(Self::Attendee),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Store-assigned id.
    pub id: UserId,
    /// Login email, unique.
    pub email: String,
    /// PHC-formatted password hash.
    pub password_hash: String,
    /// Role granted at registration.
    pub role: Role,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

/// Fields for a user about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Login email.
    pub email: String,
    /// PHC-formatted password hash.
    pub password_hash: String,
    /// Role to grant.
    pub role: Role,
}

/// Builds the outbox message (if any) announcing a freshly inserted user.
///
/// Runs inside the insert transaction, once the user id is known.
pub type Announcement = fn(&User) -> Option<OutboxMessage>;

/// Persistence port for users.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user and, in the same transaction, the outbox message
    /// returned by `announce`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` if the email is taken. Nothing is
    /// written in that case.
    async fn create_user(&self, user: NewUser, announce: Announcement) -> StoreResult<User>;

    /// Look a user up by email.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Look a user up by id.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    async fn find_by_id(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Cheap round trip used by the readiness check.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the store cannot be reached.
    async fn ping(&self) -> StoreResult<()>;
}

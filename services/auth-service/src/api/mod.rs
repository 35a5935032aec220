//! HTTP API of the auth service.

pub mod auth;
pub mod users;

use eventhub_core::identity::{Role, User, UserId};
use serde::Serialize;

/// Public view of a user: never includes the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserResponse {
    /// User id
    pub id: UserId,
    /// Login email
    pub email: String,
    /// Role
    pub role: Role,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

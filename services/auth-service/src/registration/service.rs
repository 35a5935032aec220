//! User registration and login.

use crate::registration::outbox_relay::OutboxRelay;
use crate::registration::publisher::RegistrationPublisher;
use eventhub_auth::password::{MIN_PASSWORD_LEN, hash_password, verify_password};
use eventhub_auth::validation::is_valid_email;
use eventhub_auth::{AuthError, JwtKeys};
use eventhub_core::identity::{Announcement, NewUser, Role, User, UserStore};
use eventhub_core::outbox::OutboxMessage;
use eventhub_core::registration::{RegistrationEvent, VENDOR_REGISTERED_TOPIC};
use eventhub_core::store::StoreError;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Registration and login failures.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The request is well-formed JSON but its values are not acceptable.
    #[error("{0}")]
    Validation(String),

    /// A user with this email already exists.
    #[error("email already registered")]
    DuplicateEmail,

    /// Hashing, verification or token failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The user store failed.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RegistrationError {
    fn from(err: StoreError) -> Self {
        if err.is_unique_violation() {
            Self::DuplicateEmail
        } else {
            Self::Store(err)
        }
    }
}

/// A registration request after JSON decoding.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Email, trimmed before storage.
    pub email: String,
    /// Plain-text password.
    pub password: String,
    /// Requested role; `attendee` when absent.
    pub role: Option<Role>,
}

/// How vendor registrations reach the bus.
pub enum Announcer {
    /// The outbox row is written with the user; nudge the relay afterwards.
    Outbox(Arc<OutboxRelay>),
    /// Publish in the background once the user is stored.
    Direct(Arc<RegistrationPublisher>),
}

/// Outbox row for a vendor registration; `None` for every other role.
#[must_use]
pub fn announce_vendor(user: &User) -> Option<OutboxMessage> {
    if user.role != Role::Vendor {
        return None;
    }
    RegistrationEvent::new(user.id, user.email.clone())
        .to_serialized()
        .inspect_err(|e| warn!(user_id = user.id, error = %e, "Could not encode registration event"))
        .ok()
        .map(|event| OutboxMessage {
            topic: VENDOR_REGISTERED_TOPIC.to_string(),
            event,
        })
}

const fn no_announcement(_user: &User) -> Option<OutboxMessage> {
    None
}

/// Creates users and announces vendor registrations.
pub struct RegistrationService {
    users: Arc<dyn UserStore>,
    keys: Arc<JwtKeys>,
    announcer: Announcer,
}

impl RegistrationService {
    /// Create a service.
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, keys: Arc<JwtKeys>, announcer: Announcer) -> Self {
        Self { users, keys, announcer }
    }

    /// Validate, hash and store a new user.
    ///
    /// Vendor registrations are announced after the user is durable. The
    /// announcement never changes the result: in outbox mode it was written
    /// with the user; in direct mode it is published in the background.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::Validation`] for a bad email or a short password
    /// - [`RegistrationError::DuplicateEmail`] if the email is taken
    /// - [`RegistrationError::Store`] / [`RegistrationError::Auth`] on
    ///   infrastructure failure
    pub async fn register(&self, registration: Registration) -> Result<User, RegistrationError> {
        let email = registration.email.trim().to_string();
        if !is_valid_email(&email) {
            return Err(RegistrationError::Validation("invalid email address".to_string()));
        }
        if registration.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(RegistrationError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let password_hash = hash_password(&registration.password)?;
        let new_user = NewUser {
            email,
            password_hash,
            role: registration.role.unwrap_or(Role::Attendee),
        };

        let announce: Announcement = match self.announcer {
            Announcer::Outbox(_) => announce_vendor,
            Announcer::Direct(_) => no_announcement,
        };
        let user = self.users.create_user(new_user, announce).await?;
        info!(user_id = user.id, email = %user.email, role = %user.role, "User registered");

        if user.role == Role::Vendor {
            match &self.announcer {
                Announcer::Outbox(relay) => relay.nudge(),
                Announcer::Direct(publisher) => {
                    publisher.announce(RegistrationEvent::new(user.id, user.email.clone()));
                }
            }
        }
        Ok(user)
    }

    /// Check credentials and issue an access token.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` (as [`RegistrationError::Auth`])
    /// on bad credentials, [`RegistrationError::Store`] if the store fails.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String), RegistrationError> {
        let user = self
            .users
            .find_by_email(email.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            info!(user_id = user.id, "Login rejected");
            return Err(AuthError::InvalidCredentials.into());
        }

        let token = self.keys.issue(&user)?;
        info!(user_id = user.id, "User logged in");
        Ok((user, token))
    }
}

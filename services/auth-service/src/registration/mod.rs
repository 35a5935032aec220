//! Registration flow: the service behind `POST /v1/auth/register`, the
//! event publisher, and the outbox relay that feeds it.

pub mod outbox_relay;
pub mod publisher;
pub mod service;

pub use outbox_relay::OutboxRelay;
pub use publisher::{PublishError, RegistrationPublisher};
pub use service::{Announcer, Registration, RegistrationError, RegistrationService, announce_vendor};

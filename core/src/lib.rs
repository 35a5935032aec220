//! # Eventhub Core
//!
//! Traits and domain types shared by the eventhub services.
//!
//! The auth service and the vendors service never call each other. They
//! agree on one topic contract ([`registration`]) and otherwise own their
//! data: users and the outbox live behind [`identity::UserStore`] and
//! [`outbox::OutboxStore`], vendor records behind [`vendor::VendorStore`],
//! parked messages behind [`dead_letter::DeadLetterStore`].
//!
//! ## Modules
//!
//! - [`event`] - the JSON event envelope
//! - [`event_bus`] - publish/subscribe with explicit acknowledgement
//! - [`registration`] - the `user.vendor.registered` contract
//! - [`vendor`], [`identity`], [`outbox`], [`dead_letter`] - store ports
//! - [`store`] - errors shared by all store ports
//!
//! Adapters live in `eventhub-postgres` and `eventhub-redpanda`; in-memory
//! doubles live in `eventhub-testing`.

pub mod dead_letter;
pub mod event;
pub mod event_bus;
pub mod identity;
pub mod outbox;
pub mod registration;
pub mod store;
pub mod vendor;

pub use event::{Event, EventError, SerializedEvent};
pub use event_bus::{Delivery, EventBus, EventBusError, EventStream};
pub use registration::{MalformedEvent, RegistrationEvent};
pub use store::{StoreError, StoreResult};

//! # Eventhub Testing
//!
//! In-memory doubles for every eventhub port, plus proptest strategies for
//! the registration contract.
//!
//! The doubles keep the guarantees the production adapters give: the bus
//! redelivers anything not acknowledged, the vendor store rejects duplicate
//! emails and user ids, and the user store writes a user and its outbox row
//! atomically. Each store can be told to fail its next few calls.
//!
//! ## Example
//!
//! ```
//! use eventhub_core::vendor::{NewVendor, VendorStore};
//! use eventhub_testing::InMemoryVendorStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryVendorStore::new();
//! store.create(NewVendor::linked("42", "v@test.com")).await?;
//!
//! let duplicate = store.create(NewVendor::linked("42", "other@test.com")).await;
//! assert!(duplicate.is_err());
//! # Ok(())
//! # }
//! ```

mod dead_letter;
mod event_bus;
mod faults;
mod identity_store;
mod vendor_store;

/// Mock implementations of the store and bus ports.
pub mod mocks {
    pub use crate::dead_letter::InMemoryDeadLetterStore;
    pub use crate::event_bus::InMemoryEventBus;
    pub use crate::identity_store::InMemoryUserStore;
    pub use crate::vendor_store::{InMemoryVendorStore, LaggingVendorStore};
}

/// Property-based testing strategies using proptest.
pub mod strategies {
    use eventhub_core::registration::RegistrationEvent;
    use proptest::prelude::*;

    /// A well-formed registration for one of a handful of users, so batches
    /// contain repeats.
    pub fn registration_event() -> impl Strategy<Value = RegistrationEvent> {
        (1_i64..=6).prop_map(|user_id| RegistrationEvent::new(user_id, format!("vendor{user_id}@test.com")))
    }

    /// Up to `max_len` registrations, duplicates included.
    pub fn registration_batch(max_len: usize) -> impl Strategy<Value = Vec<RegistrationEvent>> {
        prop::collection::vec(registration_event(), 0..=max_len)
    }

    /// Placeholder emails, a subset of the emails [`registration_event`] uses.
    pub fn placeholder_emails() -> impl Strategy<Value = Vec<String>> {
        prop::collection::btree_set(1_i64..=6, 0..=3)
            .prop_map(|ids| ids.into_iter().map(|id| format!("vendor{id}@test.com")).collect())
    }
}

pub use mocks::{
    InMemoryDeadLetterStore, InMemoryEventBus, InMemoryUserStore, InMemoryVendorStore, LaggingVendorStore,
};

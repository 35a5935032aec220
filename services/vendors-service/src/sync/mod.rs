//! Keeping vendor records in step with vendor registrations.
//!
//! [`reconcile`] decides and applies the effect of one registration event;
//! [`consumer`] feeds it from the bus and parks what cannot be applied.

pub mod consumer;
pub mod reconcile;

pub use consumer::VendorSyncConsumer;
pub use reconcile::{Decision, Reconciler, SyncError, SyncOutcome, decide};

//! Runtime building blocks shared by the eventhub services.
//!
//! - [`retry`] - exponential backoff policies
//! - [`lifecycle`] - the `Stopped → Starting → Running → Stopping` state machine
//!   for background components, plus the process shutdown signal
//! - [`metrics`] - Prometheus recorder and per-component metric helpers

pub mod lifecycle;
pub mod metrics;
pub mod retry;

pub use lifecycle::{Lifecycle, LifecycleError, LifecycleState, shutdown_signal};
pub use retry::{RetryPolicy, retry_with_backoff};

//! Transient failure injection shared by the in-memory stores.

use eventhub_core::store::{StoreError, StoreResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Countdown of calls that should fail.
#[derive(Debug, Clone, Default)]
pub(crate) struct Faults {
    remaining: Arc<AtomicUsize>,
}

impl Faults {
    pub(crate) fn fail_next(&self, count: usize) {
        self.remaining.store(count, Ordering::SeqCst);
    }

    /// Consume one injected failure, if any is left.
    pub(crate) fn check(&self) -> StoreResult<()> {
        let consumed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match consumed {
            Ok(_) => Err(StoreError::Unavailable("injected failure".to_string())),
            Err(_) => Ok(()),
        }
    }
}

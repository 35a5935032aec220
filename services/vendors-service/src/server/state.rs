//! Shared application state for the HTTP handlers.

use crate::sync::Reconciler;
use axum::extract::FromRef;
use eventhub_auth::JwtKeys;
use eventhub_core::dead_letter::DeadLetterStore;
use eventhub_core::vendor::VendorStore;
use eventhub_runtime::Lifecycle;
use eventhub_runtime::metrics::MetricsServer;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Vendor records
    pub vendors: Arc<dyn VendorStore>,
    /// Parked sync messages
    pub dead_letters: Arc<dyn DeadLetterStore>,
    /// Used by dead-letter replay
    pub reconciler: Reconciler,
    /// Token verification
    pub keys: Arc<JwtKeys>,
    /// Prometheus exposition
    pub metrics: Arc<MetricsServer>,
    /// Sync consumer state, reported by `/ready`
    pub sync: Lifecycle,
}

impl FromRef<AppState> for Arc<JwtKeys> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.keys)
    }
}

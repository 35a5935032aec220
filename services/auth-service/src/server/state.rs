//! Shared application state for the HTTP handlers.

use crate::registration::RegistrationService;
use axum::extract::FromRef;
use eventhub_auth::JwtKeys;
use eventhub_core::identity::UserStore;
use eventhub_runtime::Lifecycle;
use eventhub_runtime::metrics::MetricsServer;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// User lookups
    pub users: Arc<dyn UserStore>,
    /// Registration and login
    pub registration: Arc<RegistrationService>,
    /// Token signing and verification
    pub keys: Arc<JwtKeys>,
    /// Prometheus exposition
    pub metrics: Arc<MetricsServer>,
    /// Background components reported by `/ready`
    pub components: Vec<(&'static str, Lifecycle)>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        registration: Arc<RegistrationService>,
        keys: Arc<JwtKeys>,
        metrics: Arc<MetricsServer>,
    ) -> Self {
        Self {
            users,
            registration,
            keys,
            metrics,
            components: Vec::new(),
        }
    }

    /// Report `lifecycle` under `name` on `/ready`.
    #[must_use]
    pub fn with_component(mut self, name: &'static str, lifecycle: Lifecycle) -> Self {
        self.components.push((name, lifecycle));
        self
    }
}

impl FromRef<AppState> for Arc<JwtKeys> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.keys)
    }
}

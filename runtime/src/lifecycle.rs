//! Lifecycle of long-lived background components.
//!
//! Publishers, relays and consumers are constructed explicitly, passed around
//! by `Arc`, and move through
//!
//! ```text
//! Stopped ──start──▶ Starting ──ready──▶ Running ──stop──▶ Stopping ──▶ Stopped
//! ```
//!
//! [`Lifecycle`] is the shared state cell. The component's background task
//! watches it and exits when it sees [`LifecycleState::Stopping`].

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

/// Where a component is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Not running; `start` is allowed.
    Stopped,
    /// Acquiring resources.
    Starting,
    /// Doing work.
    Running,
    /// Draining in-flight work.
    Stopping,
}

impl LifecycleState {
    /// Lowercase name, as logged and reported by the readiness check.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle transition errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// `start` was called on a component that is not stopped.
    #[error("{component} cannot start while {state}")]
    AlreadyStarted {
        /// Component name
        component: String,
        /// State at the time of the call
        state: LifecycleState,
    },

    /// The component failed to acquire its resources and is stopped again.
    #[error("{component} failed to start: {reason}")]
    StartFailed {
        /// Component name
        component: String,
        /// Underlying failure
        reason: String,
    },
}

/// Shared lifecycle state of one component.
///
/// Cloning yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    name: Arc<str>,
    state: Arc<watch::Sender<LifecycleState>>,
}

impl Lifecycle {
    /// A new lifecycle in [`LifecycleState::Stopped`].
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(LifecycleState::Stopped);
        Self {
            name: Arc::from(name.into()),
            state: Arc::new(tx),
        }
    }

    /// Component name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// True while [`LifecycleState::Running`].
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Observe state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// `Stopped → Starting`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyStarted`] from any other state.
    pub fn begin_start(&self) -> Result<(), LifecycleError> {
        let mut observed = LifecycleState::Stopped;
        let moved = self.state.send_if_modified(|state| {
            observed = *state;
            if *state == LifecycleState::Stopped {
                *state = LifecycleState::Starting;
                true
            } else {
                false
            }
        });
        if moved {
            info!(component = %self.name, "Starting");
            Ok(())
        } else {
            Err(LifecycleError::AlreadyStarted {
                component: self.name.to_string(),
                state: observed,
            })
        }
    }

    /// `Starting → Running`.
    pub fn mark_running(&self) {
        let moved = self.state.send_if_modified(|state| {
            if *state == LifecycleState::Starting {
                *state = LifecycleState::Running;
                true
            } else {
                false
            }
        });
        if moved {
            info!(component = %self.name, "Running");
        }
    }

    /// Abort a start: `Starting → Stopped`, returning the error to report.
    #[must_use]
    pub fn fail_start(&self, reason: impl fmt::Display) -> LifecycleError {
        let reason = reason.to_string();
        error!(component = %self.name, error = %reason, "Failed to start");
        self.state.send_replace(LifecycleState::Stopped);
        LifecycleError::StartFailed {
            component: self.name.to_string(),
            reason,
        }
    }

    /// `Starting | Running → Stopping`.
    ///
    /// Returns `false` when there is nothing to stop (already stopped or
    /// another caller is stopping it).
    pub fn begin_stop(&self) -> bool {
        let moved = self.state.send_if_modified(|state| {
            if matches!(*state, LifecycleState::Starting | LifecycleState::Running) {
                *state = LifecycleState::Stopping;
                true
            } else {
                false
            }
        });
        if moved {
            info!(component = %self.name, "Stopping");
        }
        moved
    }

    /// `* → Stopped`.
    pub fn mark_stopped(&self) {
        let previous = self.state.send_replace(LifecycleState::Stopped);
        if previous != LifecycleState::Stopped {
            info!(component = %self.name, "Stopped");
        }
    }

    /// Resolves once a stop has been requested.
    ///
    /// Intended for `tokio::select!` in the component's background task.
    pub async fn stop_requested(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx
            .wait_for(|state| matches!(state, LifecycleState::Stopping | LifecycleState::Stopped))
            .await;
    }
}

/// Wait for Ctrl+C or SIGTERM.
///
/// If a handler cannot be installed the error is logged and that signal is
/// ignored.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn full_cycle() {
        let lifecycle = Lifecycle::new("relay");
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);

        lifecycle.begin_start().unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Starting);
        lifecycle.mark_running();
        assert!(lifecycle.is_running());

        assert!(lifecycle.begin_stop());
        assert_eq!(lifecycle.state(), LifecycleState::Stopping);
        lifecycle.mark_stopped();
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);

        // restartable
        lifecycle.begin_start().unwrap();
    }

    #[test]
    fn double_start_is_rejected() {
        let lifecycle = Lifecycle::new("consumer");
        lifecycle.begin_start().unwrap();
        let err = lifecycle.begin_start().unwrap_err();
        assert_eq!(
            err,
            LifecycleError::AlreadyStarted {
                component: "consumer".into(),
                state: LifecycleState::Starting,
            }
        );
    }

    #[test]
    fn stop_when_stopped_is_a_noop() {
        let lifecycle = Lifecycle::new("publisher");
        assert!(!lifecycle.begin_stop());
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[test]
    fn failed_start_returns_to_stopped() {
        let lifecycle = Lifecycle::new("publisher");
        lifecycle.begin_start().unwrap();
        let err = lifecycle.fail_start("broker unreachable");
        assert!(matches!(err, LifecycleError::StartFailed { .. }));
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn stop_requested_wakes_waiter() {
        let lifecycle = Lifecycle::new("consumer");
        lifecycle.begin_start().unwrap();
        lifecycle.mark_running();

        let waiter = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.stop_requested().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        lifecycle.begin_stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}

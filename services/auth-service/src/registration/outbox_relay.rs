//! Outbox relay.
//!
//! Registration writes the user and its `user.vendor.registered` row in one
//! transaction. [`OutboxRelay`] publishes pending rows in insertion order,
//! marks each one published once the bus has accepted it, and records the
//! error on the row otherwise. It wakes on a timer and on
//! [`OutboxRelay::nudge`], which the registration service calls after every
//! vendor registration.
//!
//! A row is marked only after its publish succeeded, so a crash between
//! publish and marking publishes it again. Consumers treat that as a
//! duplicate.
//!
//! Published rows stay in the table for the retention period (seven days
//! unless [`OutboxRelay::with_retention`] says otherwise). The relay deletes
//! older ones once per [`PRUNE_INTERVAL`].

use crate::registration::publisher::RegistrationPublisher;
use chrono::{TimeDelta, Utc};
use eventhub_core::outbox::OutboxStore;
use eventhub_core::store::StoreResult;
use eventhub_runtime::metrics::OutboxMetrics;
use eventhub_runtime::{Lifecycle, LifecycleError, LifecycleState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How often the relay deletes expired published rows.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);

/// Background publisher of outbox rows.
pub struct OutboxRelay {
    outbox: Arc<dyn OutboxStore>,
    publisher: Arc<RegistrationPublisher>,
    poll_interval: Duration,
    batch_size: usize,
    retention: Duration,
    lifecycle: Lifecycle,
    nudge: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl OutboxRelay {
    /// Create a stopped relay.
    #[must_use]
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        publisher: Arc<RegistrationPublisher>,
        poll_interval: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            outbox,
            publisher,
            poll_interval,
            batch_size: batch_size.max(1),
            retention: DEFAULT_RETENTION,
            lifecycle: Lifecycle::new("outbox_relay"),
            nudge: Notify::new(),
            task: Mutex::new(None),
        }
    }

    /// Keep published rows for `retention` before deleting them.
    #[must_use]
    pub const fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Lifecycle handle, for readiness reporting.
    #[must_use]
    pub const fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Ask for a relay pass now instead of at the next tick.
    pub fn nudge(&self) {
        self.nudge.notify_one();
    }

    /// Spawn the relay loop.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyStarted`] unless the relay is stopped.
    pub async fn start(self: &Arc<Self>) -> Result<(), LifecycleError> {
        self.lifecycle.begin_start()?;
        let relay = Arc::clone(self);
        let handle = tokio::spawn(async move { relay.run().await });
        *self.task.lock().await = Some(handle);
        self.lifecycle.mark_running();
        Ok(())
    }

    /// Stop the loop and wait for the current pass to finish.
    pub async fn stop(&self) {
        if !self.lifecycle.begin_stop() {
            return;
        }
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Outbox relay task ended abnormally");
            }
        }
        self.lifecycle.mark_stopped();
    }

    async fn run(&self) {
        info!(
            poll_interval_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            batch_size = self.batch_size,
            retention_hours = self.retention.as_secs() / 3600,
            "Outbox relay started"
        );

        let mut last_prune: Option<Instant> = None;
        loop {
            if last_prune.is_none_or(|at| at.elapsed() >= PRUNE_INTERVAL) {
                if let Err(e) = self.prune_once().await {
                    warn!(error = %e, "Outbox prune failed");
                }
                last_prune = Some(Instant::now());
            }

            let full_batch = match self.relay_once().await {
                Ok(relayed) => {
                    if relayed > 0 {
                        debug!(relayed, "Outbox rows published");
                    }
                    relayed == self.batch_size
                }
                Err(e) => {
                    warn!(error = %e, "Outbox relay pass failed");
                    false
                }
            };

            if full_batch {
                // More rows are likely waiting; go again unless asked to stop.
                if matches!(self.lifecycle.state(), LifecycleState::Stopping | LifecycleState::Stopped) {
                    break;
                }
                continue;
            }

            tokio::select! {
                biased;
                () = self.lifecycle.stop_requested() => break,
                () = self.nudge.notified() => {}
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Outbox relay stopped");
    }

    /// Publish up to one batch of pending rows, oldest first.
    ///
    /// Stops at the first row the bus does not accept so later rows are not
    /// published ahead of it.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](eventhub_core::store::StoreError) if the outbox
    /// cannot be read or updated.
    pub async fn relay_once(&self) -> StoreResult<usize> {
        let pending = self.outbox.fetch_pending(self.batch_size).await?;
        let mut relayed = 0;

        for entry in pending {
            match self.publisher.publish_serialized(&entry.topic, &entry.event).await {
                Ok(()) => {
                    self.outbox.mark_published(entry.id).await?;
                    relayed += 1;
                }
                Err(e) => {
                    OutboxMetrics::record_failure();
                    warn!(
                        outbox_id = entry.id,
                        topic = %entry.topic,
                        attempts = entry.attempts + 1,
                        error = %e,
                        "Outbox row not published, will retry"
                    );
                    self.outbox.record_failure(entry.id, &e.to_string()).await?;
                    break;
                }
            }
        }

        if relayed > 0 {
            OutboxMetrics::record_relayed(relayed);
        }
        OutboxMetrics::record_pending(self.outbox.count_pending().await?);
        Ok(relayed)
    }

    /// Delete rows published longer ago than the retention period.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](eventhub_core::store::StoreError) if the
    /// delete fails.
    pub async fn prune_once(&self) -> StoreResult<u64> {
        let Some(cutoff) = TimeDelta::from_std(self.retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            return Ok(0);
        };

        let pruned = self.outbox.prune_published(cutoff).await?;
        if pruned > 0 {
            OutboxMetrics::record_pruned(pruned);
            info!(pruned, "Expired outbox rows deleted");
        }
        Ok(pruned)
    }
}

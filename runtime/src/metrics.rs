//! Prometheus metrics for the eventhub services.
//!
//! Components record through the `metrics` facade; [`MetricsServer`]
//! installs the Prometheus recorder and renders the text exposition that
//! each service serves on `GET /metrics`.
//!
//! # Example
//!
//! ```rust,no_run
//! use eventhub_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new();
//! server.start()?;
//! let body = server.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the handle used to render it.
#[derive(Default)]
pub struct MetricsServer {
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create an uninstalled metrics server.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed. A recorder
    /// that is already installed (several services in one test process) is
    /// not an error; the server then renders nothing.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Registration producer
    describe_counter!(
        "registration_events_published_total",
        "Vendor registration events accepted by the bus"
    );
    describe_counter!(
        "registration_events_publish_failed_total",
        "Vendor registration events the bus rejected or could not receive"
    );
    describe_histogram!(
        "registration_publish_duration_seconds",
        "Time taken to publish a registration event"
    );

    // Outbox relay
    describe_counter!("outbox_relayed_total", "Outbox rows published and marked sent");
    describe_counter!("outbox_relay_failures_total", "Outbox rows whose publish failed");
    describe_gauge!("outbox_pending", "Outbox rows waiting to be published");
    describe_counter!("outbox_pruned_total", "Published outbox rows deleted after the retention period");

    // Vendor sync consumer
    describe_counter!(
        "vendor_sync_outcomes_total",
        "Reconciled registration events by outcome (created, linked, duplicate_skipped)"
    );
    describe_counter!(
        "vendor_sync_malformed_total",
        "Registration events discarded because they could not be decoded"
    );
    describe_counter!(
        "vendor_sync_retries_total",
        "Retries of registration events after a store failure"
    );
    describe_counter!(
        "vendor_sync_parked_total",
        "Registration events parked in the dead-letter store"
    );
    describe_histogram!(
        "vendor_sync_apply_duration_seconds",
        "Time taken to reconcile one registration event"
    );

    // Dead letters
    describe_counter!("dead_letters_resolved_total", "Dead-letter entries resolved by replay");
    describe_counter!("dead_letters_discarded_total", "Dead-letter entries discarded");
}

/// Vendor sync consumer metrics recorder.
pub struct SyncMetrics;

impl SyncMetrics {
    /// Record a reconciled event.
    pub fn record_outcome(outcome: &'static str, duration: Duration) {
        counter!("vendor_sync_outcomes_total", "outcome" => outcome).increment(1);
        histogram!("vendor_sync_apply_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a discarded malformed event.
    pub fn record_malformed() {
        counter!("vendor_sync_malformed_total").increment(1);
    }

    /// Record a retry.
    pub fn record_retry() {
        counter!("vendor_sync_retries_total").increment(1);
    }

    /// Record a parked event.
    pub fn record_parked() {
        counter!("vendor_sync_parked_total").increment(1);
    }
}

/// Registration producer metrics recorder.
pub struct PublishMetrics;

impl PublishMetrics {
    /// Record a successful publish.
    pub fn record_publish(duration: Duration) {
        counter!("registration_events_published_total").increment(1);
        histogram!("registration_publish_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a failed publish.
    pub fn record_failure() {
        counter!("registration_events_publish_failed_total").increment(1);
    }
}

/// Outbox relay metrics recorder.
pub struct OutboxMetrics;

impl OutboxMetrics {
    /// Record relayed rows.
    pub fn record_relayed(count: usize) {
        counter!("outbox_relayed_total").increment(count as u64);
    }

    /// Record a failed row.
    pub fn record_failure() {
        counter!("outbox_relay_failures_total").increment(1);
    }

    /// Record the pending backlog.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_pending(pending: i64) {
        gauge!("outbox_pending").set(pending as f64);
    }

    /// Record published rows removed by retention.
    pub fn record_pruned(count: u64) {
        counter!("outbox_pruned_total").increment(count);
    }
}

/// Dead-letter admin metrics recorder.
pub struct DeadLetterMetrics;

impl DeadLetterMetrics {
    /// Record an entry resolved by replay.
    pub fn record_resolved() {
        counter!("dead_letters_resolved_total").increment(1);
    }

    /// Record an entry discarded by an operator.
    pub fn record_discarded() {
        counter!("dead_letters_discarded_total").increment(1);
    }
}

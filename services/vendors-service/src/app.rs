//! Application coordinator: wires the vendor store, the dead-letter store and
//! the sync consumer, serves HTTP, and shuts everything down in order.

use crate::config::Config;
use crate::server::{AppState, build_router};
use crate::sync::{Reconciler, VendorSyncConsumer};
use axum::Router;
use eventhub_auth::JwtKeys;
use eventhub_core::dead_letter::DeadLetterStore;
use eventhub_core::event_bus::{EventBus, EventBusError};
use eventhub_core::store::StoreError;
use eventhub_core::vendor::VendorStore;
use eventhub_postgres::{DeadLetterQueue, PostgresVendorStore, VENDORS_MIGRATOR};
use eventhub_redpanda::RedpandaEventBus;
use eventhub_runtime::metrics::MetricsServer;
use eventhub_runtime::{LifecycleError, RetryPolicy, retry_with_backoff, shutdown_signal};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Waits for the database while the rest of the stack comes up.
const STARTUP_RETRY: RetryPolicy = RetryPolicy::builder()
    .max_retries(5)
    .initial_delay(Duration::from_secs(1))
    .max_delay(Duration::from_secs(10))
    .multiplier(2.0)
    .build();

/// Startup and serving failures.
#[derive(Error, Debug)]
pub enum StartupError {
    /// Database connection or migration failed
    #[error("Database error: {0}")]
    Store(#[from] StoreError),

    /// Event bus could not be created
    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    /// The sync consumer refused to start
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Listener could not be bound or the server failed
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// The assembled vendors service.
pub struct VendorsApp {
    state: AppState,
    consumer: Arc<VendorSyncConsumer>,
    shutdown_timeout: Duration,
}

impl VendorsApp {
    /// Connect to `PostgreSQL` and the broker, apply migrations, and assemble.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] if the database or the bus cannot be reached.
    pub async fn connect(config: &Config, metrics: Arc<MetricsServer>) -> Result<Self, StartupError> {
        info!("Connecting to vendors database...");
        let pool = retry_with_backoff(&STARTUP_RETRY, "database connect", || {
            eventhub_postgres::connect(&config.postgres.url, config.postgres.max_connections)
        })
        .await?;
        eventhub_postgres::migrate(&pool, &VENDORS_MIGRATOR).await?;
        info!("✓ Vendors database ready");

        let bus = RedpandaEventBus::builder()
            .brokers(&config.redpanda.brokers)
            .consumer_group(&config.redpanda.consumer_group)
            .auto_offset_reset(&config.redpanda.auto_offset_reset)
            .session_timeout(Duration::from_millis(config.redpanda.session_timeout_ms))
            .build()?;
        info!(
            brokers = %config.redpanda.brokers,
            consumer_group = %config.redpanda.consumer_group,
            "✓ Event bus configured"
        );

        Ok(Self::assemble(
            config,
            Arc::new(PostgresVendorStore::new(pool.clone())),
            Arc::new(DeadLetterQueue::new(pool)),
            Arc::new(bus),
            metrics,
        ))
    }

    /// Assemble the service over already constructed ports.
    ///
    /// `bus` must already be bound to the vendors consumer group.
    #[must_use]
    pub fn assemble(
        config: &Config,
        vendors: Arc<dyn VendorStore>,
        dead_letters: Arc<dyn DeadLetterStore>,
        bus: Arc<dyn EventBus>,
        metrics: Arc<MetricsServer>,
    ) -> Self {
        // Verification only; the ttl is irrelevant here.
        let keys = Arc::new(JwtKeys::new(&config.auth.secret_key, 0));
        let reconciler = Reconciler::new(Arc::clone(&vendors));

        let consumer = Arc::new(
            VendorSyncConsumer::new(bus, reconciler.clone(), Arc::clone(&dead_letters))
                .with_retry_policy(config.sync.retry_policy())
                .with_reconnect_delay(config.sync.reconnect_delay()),
        );

        let state = AppState {
            vendors,
            dead_letters,
            reconciler,
            keys,
            metrics,
            sync: consumer.lifecycle().clone(),
        };

        Self {
            state,
            consumer,
            shutdown_timeout: Duration::from_secs(config.server.shutdown_timeout),
        }
    }

    /// The HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Start the sync consumer.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] if it is already running or cannot subscribe.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        self.consumer.start().await
    }

    /// Stop the sync consumer, waiting at most the shutdown timeout.
    pub async fn stop(&self) {
        if tokio::time::timeout(self.shutdown_timeout, self.consumer.stop()).await.is_err() {
            warn!("Vendor sync consumer did not stop in time");
        }
    }

    /// Start the consumer, serve on `listener` until `shutdown` resolves, then stop.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] if the consumer cannot start or the server fails.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), StartupError> {
        self.start().await?;
        info!(address = %listener.local_addr()?, "Vendors service listening");

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;

        info!("HTTP server stopped, stopping sync consumer");
        self.stop().await;
        result.map_err(StartupError::from)
    }

    /// Bind the configured address and serve until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] if the address cannot be bound or serving fails.
    pub async fn run(self, config: &Config) -> Result<(), StartupError> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        self.serve(listener, shutdown_signal()).await
    }
}

//! Application coordinator: wires stores, bus and background components,
//! serves HTTP, and shuts everything down in order.

use crate::config::{Config, PublishMode};
use crate::registration::{Announcer, OutboxRelay, RegistrationPublisher, RegistrationService};
use crate::server::{AppState, build_router};
use axum::Router;
use eventhub_auth::JwtKeys;
use eventhub_core::event_bus::{EventBus, EventBusError};
use eventhub_core::identity::UserStore;
use eventhub_core::outbox::OutboxStore;
use eventhub_core::store::StoreError;
use eventhub_postgres::{IDENTITY_MIGRATOR, PostgresOutboxStore, PostgresUserStore};
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

    /// A background component refused to start
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Listener could not be bound or the server failed
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// The assembled auth service.
pub struct AuthApp {
    state: AppState,
    publisher: Arc<RegistrationPublisher>,
    relay: Option<Arc<OutboxRelay>>,
    shutdown_timeout: Duration,
}

impl AuthApp {
    /// Connect to `PostgreSQL` and the broker, apply migrations, and assemble.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] if the database or the bus cannot be reached.
    pub async fn connect(config: &Config, metrics: Arc<MetricsServer>) -> Result<Self, StartupError> {
        info!("Connecting to identity database...");
        let pool = retry_with_backoff(&STARTUP_RETRY, "database connect", || {
            eventhub_postgres::connect(&config.postgres.url, config.postgres.max_connections)
        })
        .await?;
        eventhub_postgres::migrate(&pool, &IDENTITY_MIGRATOR).await?;
        info!("✓ Identity database ready");

        let bus = RedpandaEventBus::builder()
            .brokers(&config.redpanda.brokers)
            .timeout(Duration::from_millis(config.redpanda.producer_timeout_ms))
            .build()?;
        info!(brokers = %config.redpanda.brokers, "✓ Event bus configured");

        Ok(Self::assemble(
            config,
            Arc::new(PostgresUserStore::new(pool.clone())),
            Arc::new(PostgresOutboxStore::new(pool)),
            Arc::new(bus),
            metrics,
        ))
    }

    /// Assemble the service over already constructed ports.
    #[must_use]
    pub fn assemble(
        config: &Config,
        users: Arc<dyn UserStore>,
        outbox: Arc<dyn OutboxStore>,
        bus: Arc<dyn EventBus>,
        metrics: Arc<MetricsServer>,
    ) -> Self {
        let keys = Arc::new(JwtKeys::new(&config.auth.secret_key, config.auth.token_ttl_minutes));
        let publisher = Arc::new(RegistrationPublisher::new(bus));

        let (announcer, relay) = match config.outbox.mode {
            PublishMode::Outbox => {
                let relay = Arc::new(OutboxRelay::new(
                    outbox,
                    Arc::clone(&publisher),
                    config.outbox.poll_interval(),
                    config.outbox.batch_size,
                )
                .with_retention(config.outbox.retention()));
                (Announcer::Outbox(Arc::clone(&relay)), Some(relay))
            }
            PublishMode::Direct => (Announcer::Direct(Arc::clone(&publisher)), None),
        };
        info!(mode = %config.outbox.mode, "Registration events configured");

        let registration = Arc::new(RegistrationService::new(
            Arc::clone(&users),
            Arc::clone(&keys),
            announcer,
        ));

        let mut state = AppState::new(users, registration, keys, metrics)
            .with_component("registration_publisher", publisher.lifecycle().clone());
        if let Some(relay) = &relay {
            state = state.with_component("outbox_relay", relay.lifecycle().clone());
        }

        Self {
            state,
            publisher,
            relay,
            shutdown_timeout: Duration::from_secs(config.server.shutdown_timeout),
        }
    }

    /// The HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Start the publisher, then the relay.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] if a component is already running.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        self.publisher.start()?;
        if let Some(relay) = &self.relay {
            relay.start().await?;
        }
        Ok(())
    }

    /// Stop the relay, then the publisher.
    pub async fn stop(&self) {
        if let Some(relay) = &self.relay {
            if tokio::time::timeout(self.shutdown_timeout, relay.stop()).await.is_err() {
                warn!("Outbox relay did not stop in time");
            }
        }
        self.publisher.stop();
    }

    /// Start components, serve on `listener` until `shutdown` resolves, then stop.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] if a component cannot start or the server fails.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), StartupError> {
        self.start().await?;
        info!(address = %listener.local_addr()?, "Auth service listening");

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;

        info!("HTTP server stopped, stopping background components");
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

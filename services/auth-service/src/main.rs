//! Auth service HTTP server.

use auth_service::{AuthApp, Config};
use eventhub_runtime::metrics::MetricsServer;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,auth_service=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting auth service");

    let config = Config::from_env();
    info!(
        postgres_url = %config.postgres.url,
        brokers = %config.redpanda.brokers,
        publish_mode = %config.outbox.mode,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new();
    metrics.start()?;

    let app = AuthApp::connect(&config, Arc::new(metrics)).await?;
    app.run(&config).await?;

    info!("Auth service stopped");
    Ok(())
}

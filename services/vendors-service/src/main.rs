//! Vendors service HTTP server and sync consumer.

use eventhub_runtime::metrics::MetricsServer;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vendors_service::{Config, VendorsApp};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vendors_service=debug,sqlx=warn,rdkafka=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting vendors service");

    let config = Config::from_env();
    info!(
        postgres_url = %config.postgres.url,
        brokers = %config.redpanda.brokers,
        consumer_group = %config.redpanda.consumer_group,
        max_retries = config.sync.max_retries,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new();
    metrics.start()?;

    let app = VendorsApp::connect(&config, Arc::new(metrics)).await?;
    app.run(&config).await?;

    info!("Vendors service stopped");
    Ok(())
}

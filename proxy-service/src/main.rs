use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use db::{DbConfig, SqlxFactory};
use proxy_service::{Pool, ProxyConfig, Registry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proxy_service=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = ProxyConfig::from_env();
    let db_config = DbConfig::from_env()?;
    tracing::info!("Starting connection proxy v{}", config.version);

    // Construct the pool and spawn its workers; the transport serving
    // callers attaches to worker handles from here
    let registry = Arc::new(Registry::new());
    let pool = Pool::connect(
        &registry,
        db_config,
        &config.database_name,
        Arc::new(SqlxFactory),
        config.liveness_interval(),
    )
    .await?;
    pool.spawn(config.workers);

    tracing::info!(
        database = %config.database_name,
        workers = config.workers,
        "connection pool running"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");

    Ok(())
}

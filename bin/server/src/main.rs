use boltflow_server::{
    config::ServerConfig, connect_database, db::PgWorkflowStore, error::ServerError,
    services::spawn_scheduler,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "boltflowd failed");
        std::process::exit(1);
    }
}

async fn run() -> boltflow_core::Result<(), ServerError> {
    let config = ServerConfig::from_env().map_err(|e| ServerError::Config {
        details: e.to_string(),
    })?;
    tracing::info!("Loaded configuration");

    let pool = connect_database(&config).await?;
    let workflows = Arc::new(PgWorkflowStore::new(pool));

    let cancel = CancellationToken::new();
    let handles = spawn_scheduler(workflows, &config, cancel.clone());
    tracing::info!(
        tick_seconds = config.scheduler.tick_seconds,
        "time trigger scheduler started"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
    cancel.cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "service task ended abnormally");
        }
    }
    Ok(())
}

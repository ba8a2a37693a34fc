mod bootstrap;
mod health;
mod products;
mod scheduler;
mod service;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use stockinfo_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use stockinfo_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let router = Router::new()
        .merge(products::router(app.service.clone()))
        .merge(health::router(app.db_pool.clone(), app.scheduler.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "stockinfo-server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "stockinfo-server stopping"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, app.scheduler.shutdown()).await {
        Ok(Ok(abandoned)) => tracing::info!(
            event_name = "system.scheduler.stopped",
            correlation_id = "shutdown",
            abandoned,
            "price update scheduler stopped"
        ),
        Ok(Err(error)) => tracing::warn!(
            event_name = "system.scheduler.stopped",
            correlation_id = "shutdown",
            error = %error,
            "price update scheduler was already stopped"
        ),
        Err(_) => tracing::warn!(
            event_name = "system.scheduler.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "price update scheduler did not stop within the grace period"
        ),
    }

    app.db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal"
        );
    }
}

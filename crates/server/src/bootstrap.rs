use std::sync::Arc;

use stockinfo_core::config::{AppConfig, ConfigError};
use stockinfo_db::repositories::{SqlPriceUpdateEventRepository, SqlProductRepository};
use stockinfo_db::{connect, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::scheduler::PriceUpdateScheduler;
use crate::service::ProductService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub scheduler: PriceUpdateScheduler,
    pub service: ProductService,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    // The worker gets its own repository handles; only the pool is shared.
    let scheduler = PriceUpdateScheduler::spawn(
        Arc::new(SqlProductRepository::new(db_pool.clone())),
        Arc::new(SqlPriceUpdateEventRepository::new(db_pool.clone())),
        config.price_update.overlap_policy,
        config.price_update.queue_capacity,
    );
    let service = ProductService::new(
        Arc::new(SqlProductRepository::new(db_pool.clone())),
        Arc::new(SqlPriceUpdateEventRepository::new(db_pool.clone())),
        scheduler.clone(),
        &config.price_update,
    );
    info!(
        event_name = "system.bootstrap.scheduler_started",
        correlation_id = "bootstrap",
        delay_minutes = config.price_update.delay_minutes,
        overlap_policy = config.price_update.overlap_policy.as_str(),
        "price update scheduler started"
    );

    Ok(Application { config, db_pool, scheduler, service })
}

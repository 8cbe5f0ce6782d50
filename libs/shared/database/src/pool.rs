use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use shared_config::AppConfig;

pub type DbPool = PgPool;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Opens the pool and verifies one connection can be acquired.
pub async fn connect(config: &AppConfig) -> Result<DbPool> {
    info!(
        "Connecting to database (max {} connections)",
        config.db_max_connections
    );

    let pool = pool_options(config)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;

    debug!("Database pool ready");
    Ok(pool)
}

/// Builds a pool that only connects on first use.
pub fn connect_lazy(config: &AppConfig) -> Result<DbPool> {
    pool_options(config)
        .connect_lazy(&config.database_url)
        .context("invalid database url")
}

fn pool_options(config: &AppConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections.max(1))
        .acquire_timeout(Duration::from_secs(5))
}

pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    info!("Running database migrations");
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    Ok(())
}

pub async fn ping(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("database ping failed")?;
    Ok(())
}

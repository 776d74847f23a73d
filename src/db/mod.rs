//! Postgres plumbing for the `job_states` watermark table.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;

pub mod operations;
pub mod pool;

pub use operations::*;
pub use pool::*;

/// Opens a pool sized from config and fails fast if the server is unreachable.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect(&config.url)
        .await
        .context("connecting to the watermark database")?;

    health_check(&pool).await?;
    Ok(pool)
}

/// Applies `migrations/`, which creates `job_states`.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("running job_states migrations")
}

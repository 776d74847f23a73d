// Postgres-backed watermark store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use super::{JobState, StateField, WatermarkStore};
use crate::db::DatabaseOperations;
use crate::types::AppResult;

#[derive(Clone)]
pub struct PostgresWatermarkStore {
    pool: PgPool,
}

impl PostgresWatermarkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WatermarkStore for PostgresWatermarkStore {
    async fn get(&self, job_name: &str) -> AppResult<Option<JobState>> {
        let row = DatabaseOperations::get_job_state(&self.pool, job_name).await?;
        Ok(row.map(JobState::from))
    }

    async fn set_field(
        &self,
        job_name: &str,
        field: StateField,
        value: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut state = self.get(job_name).await?.unwrap_or_default();
        state.set(field, value);

        debug!(job_name, %field, %value, "Writing job state");
        DatabaseOperations::upsert_job_state(&self.pool, job_name, &state).await
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

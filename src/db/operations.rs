use sqlx::PgPool;
use chrono::{DateTime, Utc};

use crate::state::JobState;
use crate::types::AppResult;

// Runtime queries (query_as) so builds do not need DATABASE_URL
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobStateRow {
    pub job_name: String,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub last_watermark: Option<DateTime<Utc>>,
}

impl From<JobStateRow> for JobState {
    fn from(row: JobStateRow) -> Self {
        JobState {
            last_attempted_at: row.last_attempted_at,
            last_watermark: row.last_watermark,
        }
    }
}

pub struct DatabaseOperations;

impl DatabaseOperations {
    pub async fn get_job_state(pool: &PgPool, job_name: &str) -> AppResult<Option<JobStateRow>> {
        let row = sqlx::query_as::<_, JobStateRow>(
            r#"
            SELECT job_name, last_attempted_at, last_watermark
            FROM job_states
            WHERE job_name = $1
            "#,
        )
        .bind(job_name)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Writes the whole record, inserting it if the job has no row yet.
    pub async fn upsert_job_state(
        pool: &PgPool,
        job_name: &str,
        state: &JobState,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO job_states (job_name, last_attempted_at, last_watermark)
            VALUES ($1, $2, $3)
            ON CONFLICT (job_name) DO UPDATE
            SET last_attempted_at = EXCLUDED.last_attempted_at,
                last_watermark = EXCLUDED.last_watermark,
                updated_at = NOW()
            "#,
        )
        .bind(job_name)
        .bind(state.last_attempted_at)
        .bind(state.last_watermark)
        .execute(pool)
        .await?;

        Ok(())
    }
}

use sqlx::postgres::PgPool;

/// Round-trips a trivial query to prove the pool can reach the server.
pub async fn health_check(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

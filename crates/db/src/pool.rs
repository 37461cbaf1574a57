//! Postgres connection pool and embedded migrations.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::DbError;

/// Shared Postgres pool used by every store.
pub type DbPool = PgPool;

/// How long a caller waits for a free connection before the store call
/// fails (and the step that made it is retried).
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Open a pool of at most `max_connections` against `database_url`.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, DbError> {
    info!(max_connections, "opening database pool");
    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await
        .map_err(DbError::from)
}

/// Bring the schema up to date with the workspace `migrations/` directory.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    let migrator = sqlx::migrate!("../../migrations");
    info!(available = migrator.iter().count(), "applying database migrations");
    migrator.run(pool).await?;
    Ok(())
}

//! Step checkpoint operations.

use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::StepRow;
use crate::DbError;

pub async fn load_step(
    pool: &PgPool,
    run_id: Uuid,
    step_name: &str,
) -> Result<Option<StepRow>, DbError> {
    let row = sqlx::query_as::<_, StepRow>(
        r#"
        SELECT run_id, step_name, output, created_at
        FROM step_checkpoints
        WHERE run_id = $1 AND step_name = $2
        "#,
    )
    .bind(run_id)
    .bind(step_name)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Commit a step output. An existing checkpoint is left untouched.
pub async fn save_step(
    pool: &PgPool,
    run_id: Uuid,
    step_name: &str,
    output: &Value,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO step_checkpoints (run_id, step_name, output, created_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (run_id, step_name) DO NOTHING
        "#,
    )
    .bind(run_id)
    .bind(step_name)
    .bind(output)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Forget every checkpoint of `run_id`. Returns the number removed.
pub async fn delete_run_steps(pool: &PgPool, run_id: Uuid) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM step_checkpoints WHERE run_id = $1")
        .bind(run_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

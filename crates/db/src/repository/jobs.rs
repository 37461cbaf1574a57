//! Job queue repository functions.
//!
//! The queue is backed by the `job_queue` Postgres table.
//! Workers poll the table and use `SELECT … FOR UPDATE SKIP LOCKED`
//! for safe concurrent processing. A claim is a lease: a job left
//! `processing` past it is handed to the next poller.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::models::{JobRow, JobStatus};
use crate::DbError;

const JOB_COLUMNS: &str =
    "id, run_id, workflow_id, status, attempts, max_attempts, payload, last_error, created_at, updated_at";

/// Enqueue a run of `workflow_id`.
///
/// `payload` is the serialized run request the worker hands to the engine.
pub async fn enqueue_job(
    pool: &PgPool,
    run_id: Uuid,
    workflow_id: Uuid,
    payload: serde_json::Value,
    max_attempts: i32,
) -> Result<JobRow, DbError> {
    let now = Utc::now();
    let sql = format!(
        r#"
        INSERT INTO job_queue
            (id, run_id, workflow_id, status, attempts, max_attempts, payload, created_at, updated_at)
        VALUES ($1, $2, $3, $4, 0, $5, $6, $7, $7)
        RETURNING {JOB_COLUMNS}
        "#
    );

    let row = sqlx::query_as::<_, JobRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(run_id)
        .bind(workflow_id)
        .bind(JobStatus::Pending.as_str())
        .bind(max_attempts.max(1))
        .bind(payload)
        .bind(now)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Oldest `updated_at` a `processing` job may carry before its claim lapses.
/// `None` when the lease is too long to ever expire.
pub fn lease_cutoff(now: DateTime<Utc>, lease: Duration) -> Option<DateTime<Utc>> {
    let lease = chrono::Duration::from_std(lease).ok()?;
    now.checked_sub_signed(lease)
}

/// Atomically claim the oldest runnable job and mark it as `processing`.
///
/// Runnable means `pending`, or `processing` with a claim older than
/// `lease`: the worker that held it died or lost the database before it
/// could settle the job. Uses `SELECT … FOR UPDATE SKIP LOCKED` so multiple
/// workers can poll safely without stepping on each other.
///
/// Returns `None` if nothing is runnable. The returned row already
/// reflects the claim (status and attempt count).
pub async fn fetch_next_job(pool: &PgPool, lease: Duration) -> Result<Option<JobRow>, DbError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let claimed: Option<(Uuid, String)> = sqlx::query_as(
        r#"
        SELECT id, status
        FROM job_queue
        WHERE status = 'pending'
           OR (status = 'processing' AND updated_at < $1)
        ORDER BY created_at ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(lease_cutoff(now, lease))
    .fetch_optional(&mut *tx)
    .await?;

    let Some((id, previous)) = claimed else {
        tx.rollback().await?;
        return Ok(None);
    };
    if previous == JobStatus::Processing.as_str() {
        warn!(job_id = %id, "reclaiming job with an expired lease");
    }

    let sql = format!(
        r#"
        UPDATE job_queue
        SET status = $1, attempts = attempts + 1, updated_at = $2
        WHERE id = $3
        RETURNING {JOB_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, JobRow>(&sql)
        .bind(JobStatus::Processing.as_str())
        .bind(now)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Some(row))
}

/// Mark a job as completed.
pub async fn complete_job(pool: &PgPool, job_id: Uuid) -> Result<(), DbError> {
    sqlx::query("UPDATE job_queue SET status = $1, last_error = NULL, updated_at = $2 WHERE id = $3")
        .bind(JobStatus::Completed.as_str())
        .bind(Utc::now())
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record a failed attempt and return the status the job ended up in.
///
/// A retryable failure goes back to `pending` until `max_attempts` is
/// reached, then to `dead_lettered`. Anything else is `failed` at once.
pub async fn fail_job(
    pool: &PgPool,
    job_id: Uuid,
    error: &str,
    retryable: bool,
) -> Result<JobStatus, DbError> {
    let status: Option<(String,)> = sqlx::query_as(
        r#"
        UPDATE job_queue
        SET status = CASE
                WHEN NOT $1 THEN 'failed'
                WHEN attempts >= max_attempts THEN 'dead_lettered'
                ELSE 'pending'
            END,
            last_error = $2,
            updated_at = $3
        WHERE id = $4
        RETURNING status
        "#,
    )
    .bind(retryable)
    .bind(error)
    .bind(Utc::now())
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    let (status,) = status.ok_or(DbError::NotFound)?;
    status
        .parse()
        .map_err(|message: String| DbError::corrupt("job_queue", message))
}

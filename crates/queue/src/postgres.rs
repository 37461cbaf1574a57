//! Job source backed by the `job_queue` table.

use std::time::Duration;

use async_trait::async_trait;
use db::repository::jobs;
use db::DbPool;
use engine::RunRequest;
use tracing::{debug, error};
use uuid::Uuid;

use crate::job::{Job, JobSource, JobStatus, DEFAULT_LEASE, DEFAULT_MAX_ATTEMPTS};
use crate::QueueError;

#[derive(Debug, Clone)]
pub struct PgJobQueue {
    pool: DbPool,
    max_attempts: u32,
    lease: Duration,
}

impl PgJobQueue {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lease: DEFAULT_LEASE,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }
}

#[async_trait]
impl JobSource for PgJobQueue {
    async fn enqueue(&self, request: RunRequest) -> Result<Uuid, QueueError> {
        let payload = serde_json::to_value(&request).map_err(QueueError::Encode)?;
        let max_attempts = i32::try_from(self.max_attempts).unwrap_or(i32::MAX);
        let row = jobs::enqueue_job(
            &self.pool,
            request.run_id,
            request.workflow_id,
            payload,
            max_attempts,
        )
        .await?;
        debug!(job_id = %row.id, run_id = %row.run_id, "job enqueued");
        Ok(row.id)
    }

    async fn next(&self) -> Result<Option<Job>, QueueError> {
        let Some(row) = jobs::fetch_next_job(&self.pool, self.lease).await? else {
            return Ok(None);
        };

        match serde_json::from_value::<RunRequest>(row.payload) {
            Ok(request) => Ok(Some(Job {
                id: row.id,
                request,
                attempt: u32::try_from(row.attempts).unwrap_or(0),
                max_attempts: u32::try_from(row.max_attempts).unwrap_or(1),
            })),
            Err(source) => {
                // Park it so the next poll does not claim it again.
                error!(job_id = %row.id, error = %source, "unreadable job payload");
                jobs::fail_job(&self.pool, row.id, &source.to_string(), false).await?;
                Err(QueueError::Payload {
                    job_id: row.id,
                    source,
                })
            }
        }
    }

    async fn complete(&self, job: &Job) -> Result<(), QueueError> {
        jobs::complete_job(&self.pool, job.id).await?;
        Ok(())
    }

    async fn fail(&self, job: &Job, error: &str, retryable: bool) -> Result<JobStatus, QueueError> {
        Ok(jobs::fail_job(&self.pool, job.id, error, retryable).await?)
    }
}

//! Jobs and the contract every job source implements.

use std::time::Duration;

use async_trait::async_trait;
pub use db::models::JobStatus;
use engine::RunRequest;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::QueueError;

/// Attempts a job gets before it is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How long a claimed job may stay `processing` before another poller
/// takes it over. Must outlast the slowest run.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(300);

/// One queued run, as handed to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub request: RunRequest,
    /// 1-based number of the attempt this claim represents.
    pub attempt: u32,
    pub max_attempts: u32,
}

/// A store of pending runs.
///
/// `next` claims the oldest pending job. Every claimed job must be settled
/// with `complete` or `fail`. A retryable failure puts the job back with
/// the same run id, so the next attempt resumes from its checkpoints.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn enqueue(&self, request: RunRequest) -> Result<Uuid, QueueError>;

    async fn next(&self) -> Result<Option<Job>, QueueError>;

    async fn complete(&self, job: &Job) -> Result<(), QueueError>;

    /// Record a failed attempt; returns where the job ended up.
    async fn fail(&self, job: &Job, error: &str, retryable: bool) -> Result<JobStatus, QueueError>;
}

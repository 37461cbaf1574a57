//! In-process job source, used by the CLI `run` path and by tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use engine::RunRequest;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::job::{Job, JobSource, JobStatus, DEFAULT_LEASE, DEFAULT_MAX_ATTEMPTS};
use crate::QueueError;

#[derive(Debug)]
struct Entry {
    job: Job,
    status: JobStatus,
    last_error: Option<String>,
    claimed_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Inner {
    pending: VecDeque<Uuid>,
    entries: HashMap<Uuid, Entry>,
}

/// FIFO queue held in memory.
#[derive(Debug)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
    max_attempts: u32,
    lease: Duration,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl MemoryQueue {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_attempts: max_attempts.max(1),
            lease: DEFAULT_LEASE,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn status(&self, job_id: Uuid) -> Option<JobStatus> {
        self.lock().entries.get(&job_id).map(|e| e.status)
    }

    pub fn last_error(&self, job_id: Uuid) -> Option<String> {
        self.lock()
            .entries
            .get(&job_id)
            .and_then(|e| e.last_error.clone())
    }

    /// Number of jobs waiting to be claimed.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    /// The longest-held `processing` job whose claim is older than `lease`.
    fn expired(&self, now: Instant, lease: Duration) -> Option<Uuid> {
        self.entries
            .iter()
            .filter(|(_, e)| e.status == JobStatus::Processing)
            .filter_map(|(id, e)| e.claimed_at.map(|at| (*id, at)))
            .filter(|(_, at)| now.saturating_duration_since(*at) >= lease)
            .min_by_key(|(_, at)| *at)
            .map(|(id, _)| id)
    }
}

#[async_trait]
impl JobSource for MemoryQueue {
    async fn enqueue(&self, request: RunRequest) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        let mut inner = self.lock();
        inner.entries.insert(
            id,
            Entry {
                job: Job {
                    id,
                    request,
                    attempt: 0,
                    max_attempts: self.max_attempts,
                },
                status: JobStatus::Pending,
                last_error: None,
                claimed_at: None,
            },
        );
        inner.pending.push_back(id);
        Ok(id)
    }

    async fn next(&self) -> Result<Option<Job>, QueueError> {
        let mut inner = self.lock();
        let now = Instant::now();
        let id = match inner.pending.pop_front() {
            Some(id) => id,
            None => match inner.expired(now, self.lease) {
                Some(id) => {
                    warn!(job_id = %id, "reclaiming job with an expired lease");
                    id
                }
                None => return Ok(None),
            },
        };
        let entry = inner.entries.get_mut(&id).ok_or(QueueError::UnknownJob(id))?;
        entry.status = JobStatus::Processing;
        entry.claimed_at = Some(now);
        entry.job.attempt += 1;
        Ok(Some(entry.job.clone()))
    }

    async fn complete(&self, job: &Job) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let entry = inner
            .entries
            .get_mut(&job.id)
            .ok_or(QueueError::UnknownJob(job.id))?;
        entry.status = JobStatus::Completed;
        entry.last_error = None;
        entry.claimed_at = None;
        Ok(())
    }

    async fn fail(&self, job: &Job, error: &str, retryable: bool) -> Result<JobStatus, QueueError> {
        let mut inner = self.lock();
        let entry = inner
            .entries
            .get_mut(&job.id)
            .ok_or(QueueError::UnknownJob(job.id))?;

        entry.last_error = Some(error.to_string());
        entry.claimed_at = None;
        entry.status = if !retryable {
            JobStatus::Failed
        } else if entry.job.attempt >= entry.job.max_attempts {
            JobStatus::DeadLettered
        } else {
            JobStatus::Pending
        };
        let status = entry.status;
        if status == JobStatus::Pending {
            inner.pending.push_back(job.id);
        }
        debug!(job_id = %job.id, %status, "job failed");
        Ok(status)
    }
}

//! Worker loop: claims jobs and drives them through the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use engine::WorkflowExecutor;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::job::{JobSource, JobStatus};
use crate::QueueError;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// What happened to one claimed job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobReport {
    Completed {
        job_id: Uuid,
        run_id: Uuid,
        executed: usize,
    },
    Failed {
        job_id: Uuid,
        run_id: Uuid,
        status: JobStatus,
        error: String,
    },
}

impl JobReport {
    pub fn job_id(&self) -> Uuid {
        match self {
            Self::Completed { job_id, .. } | Self::Failed { job_id, .. } => *job_id,
        }
    }
}

pub struct Worker {
    source: Arc<dyn JobSource>,
    executor: Arc<WorkflowExecutor>,
    config: WorkerConfig,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(
        source: Arc<dyn JobSource>,
        executor: Arc<WorkflowExecutor>,
        config: WorkerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            executor,
            config,
            cancel,
        }
    }

    /// Claim and run at most one job. `None` when the queue is empty.
    pub async fn run_once(&self) -> Result<Option<JobReport>, QueueError> {
        let Some(job) = self.source.next().await? else {
            return Ok(None);
        };
        let run_id = job.request.run_id;
        info!(
            job_id = %job.id,
            %run_id,
            workflow_id = %job.request.workflow_id,
            attempt = job.attempt,
            "job claimed"
        );

        match self.executor.run(job.request.clone()).await {
            Ok(result) => {
                self.source.complete(&job).await?;
                info!(job_id = %job.id, %run_id, executed = result.executed.len(), "job completed");
                Ok(Some(JobReport::Completed {
                    job_id: job.id,
                    run_id,
                    executed: result.executed.len(),
                }))
            }
            Err(failure) => {
                let message = failure.error.to_string();
                let status = self
                    .source
                    .fail(&job, &message, failure.is_retryable())
                    .await?;
                warn!(
                    job_id = %job.id,
                    %run_id,
                    failed_node = failure.failed_node.as_deref(),
                    %status,
                    error = %message,
                    "job failed"
                );
                Ok(Some(JobReport::Failed {
                    job_id: job.id,
                    run_id,
                    status,
                    error: message,
                }))
            }
        }
    }

    /// Spawns the worker as a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Drain jobs until cancelled, sleeping `poll_interval` whenever the
    /// queue is empty or the source errors.
    pub async fn run(&self) {
        info!(poll_interval_ms = self.config.poll_interval.as_millis() as u64, "worker started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let idle = match self.run_once().await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(err) => {
                    error!(error = %err, "job source error");
                    true
                }
            };

            if idle {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => break,
                    () = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!("worker stopped");
    }
}

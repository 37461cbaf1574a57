//! `queue` crate: durable run requests and the worker that drains them.
//!
//! A [`JobSource`] hands out [`Job`]s; the [`Worker`] runs each through the
//! engine's `WorkflowExecutor` and settles it. Retryable run failures go back
//! on the queue under the same run id, so the next attempt replays every step
//! that already committed.

pub mod error;
pub mod job;
pub mod memory;
pub mod postgres;
pub mod worker;

pub use error::QueueError;
pub use job::{Job, JobSource, JobStatus, DEFAULT_LEASE, DEFAULT_MAX_ATTEMPTS};
pub use memory::MemoryQueue;
pub use postgres::PgJobQueue;
pub use worker::{JobReport, Worker, WorkerConfig};

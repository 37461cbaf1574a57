use db::DbError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Db(#[from] DbError),

    /// A stored job payload is not a run request.
    #[error("job {job_id} has an unreadable payload: {source}")]
    Payload {
        job_id: Uuid,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not serialise run request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("unknown job {0}")]
    UnknownJob(Uuid),
}

//! Typed error type for the db crate.

use engine::{EngineError, StoreError};
use nodes::NodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be mapped back onto its domain type.
    #[error("corrupt row in {table}: {message}")]
    Corrupt {
        table: &'static str,
        message: String,
    },
}

impl DbError {
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Self::Corrupt {
            table,
            message: message.into(),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        StoreError::new(err.to_string())
    }
}

impl From<DbError> for NodeError {
    /// Database trouble during a node is an outage, not a bad configuration.
    fn from(err: DbError) -> Self {
        NodeError::transient(err.to_string())
    }
}

/// Saving a workflow can fail validation before the database is touched.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("invalid workflow: {0}")]
    Invalid(#[source] EngineError),

    #[error(transparent)]
    Db(#[from] DbError),
}

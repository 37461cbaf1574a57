//! `db` crate: Postgres persistence for workflows, credentials, step
//! checkpoints and the run queue.
//!
//! `repository` holds the raw SQL, one function per statement. `stores`
//! adapts it to the storage traits the engine and the nodes depend on.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;
pub mod stores;

pub use error::{DbError, SaveError};
pub use pool::{create_pool, run_migrations, DbPool};
pub use stores::{PgCredentialStore, PgStepStore, PgWorkflowStore};

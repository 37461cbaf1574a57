//! Repository functions, one per database operation.
//!
//! Every function takes a `&PgPool` and returns a `Result<T, DbError>`.
//! No business logic, no domain types: rows in, rows out.

pub mod credentials;
pub mod jobs;
pub mod steps;
pub mod workflows;

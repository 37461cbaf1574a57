//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models: they carry no domain behaviour.
//! Domain types live in the `engine` and `nodes` crates; `stores` converts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows / nodes / connections
// ---------------------------------------------------------------------------

/// A persisted workflow header row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One node of a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NodeRow {
    pub workflow_id: Uuid,
    pub id: String,
    #[sqlx(rename = "type")]
    pub node_type: String,
    pub name: String,
    pub position: Option<Value>,
    pub data: Value,
    pub ordinal: i32,
}

/// One edge of a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConnectionRow {
    pub workflow_id: Uuid,
    pub id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    pub from_output: String,
    pub to_input: String,
}

// ---------------------------------------------------------------------------
// credentials
// ---------------------------------------------------------------------------

/// A stored provider credential.
#[derive(Clone, Serialize, Deserialize, FromRow)]
pub struct CredentialRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[sqlx(rename = "type")]
    pub credential_type: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for CredentialRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRow")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("name", &self.name)
            .field("credential_type", &self.credential_type)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// step_checkpoints
// ---------------------------------------------------------------------------

/// Committed output of one named step of one run.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StepRow {
    pub run_id: Uuid,
    pub step_name: String,
    pub output: Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// job_queue
// ---------------------------------------------------------------------------

/// Possible statuses for a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    /// Failed permanently; retrying cannot help.
    Failed,
    /// Failed transiently on every allowed attempt.
    DeadLettered,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::DeadLettered => "dead_lettered",
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::DeadLettered)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "dead_lettered" => Ok(Self::DeadLettered),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A job row fetched from the queue table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub run_id: Uuid,
    pub workflow_id: Uuid,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    /// Serialized run request.
    pub payload: Value,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRow {
    pub fn status(&self) -> Result<JobStatus, String> {
        self.status.parse()
    }
}

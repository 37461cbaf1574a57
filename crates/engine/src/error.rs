//! Engine-level error types.

use nodes::{Context, NodeError};
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// A connection references a node ID that doesn't exist in the workflow.
    #[error("connection '{connection_id}' references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        connection_id: String,
        node_id: String,
        side: &'static str,
    },

    /// Topological sort could not place these nodes.
    #[error("workflow graph contains a cycle through {remaining:?}")]
    CycleDetected { remaining: Vec<String> },

    #[error("node '{node_id}' has an invalid variable name '{name}'")]
    InvalidVariableName { node_id: String, name: String },

    #[error("variable name '{name}' is used by both '{first}' and '{second}'")]
    VariableNameCollision {
        name: String,
        first: String,
        second: String,
    },

    // ------ Execution errors ------

    /// No executor is registered for the node's type.
    #[error("no executor registered for node '{node_id}' of type '{node_type}'")]
    Dispatch { node_id: String, node_type: String },

    /// A node's executor failed; the whole run is aborted.
    #[error("node '{node_id}' failed: {source}")]
    Node {
        node_id: String,
        #[source]
        source: NodeError,
    },

    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    /// The initial payload was not a JSON object.
    #[error("initial data must be a JSON object")]
    InvalidInitialData,

    /// Persistence error from a workflow store or the step substrate.
    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    /// Whether re-running the same request could succeed.
    ///
    /// Store outages and transient node failures that escaped the step
    /// runner qualify. A node that exhausted its retry budget does not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(_) => true,
            Self::Node { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// A failed run: the cause plus everything the orchestrator had built so far.
#[derive(Debug, Error)]
#[error("run {run_id} failed: {error}")]
pub struct RunFailure {
    pub run_id: Uuid,
    #[source]
    pub error: EngineError,
    /// The node that was executing when the run stopped, if any.
    pub failed_node: Option<String>,
    /// Context as it stood before the failing node.
    pub context: Context,
}

impl RunFailure {
    pub fn is_retryable(&self) -> bool {
        self.error.is_retryable()
    }
}

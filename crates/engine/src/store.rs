//! Workflow snapshot lookup.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Workflow;
use crate::EngineError;

/// Failure of an external store (workflows, steps).
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Store(err.0)
    }
}

/// Source of workflow snapshots.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Load the nodes and connections of `workflow_id`, or `Ok(None)` if
    /// it does not exist.
    async fn load_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>, StoreError>;
}

/// Workflows held in memory, keyed by id.
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, workflow: Workflow) {
        self.workflows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(workflow.id, workflow);
    }

    pub fn remove(&self, workflow_id: Uuid) -> Option<Workflow> {
        self.workflows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&workflow_id)
    }
}

impl FromIterator<Workflow> for MemoryWorkflowStore {
    fn from_iter<I: IntoIterator<Item = Workflow>>(iter: I) -> Self {
        let store = Self::new();
        for workflow in iter {
            store.insert(workflow);
        }
        store
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn load_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>, StoreError> {
        Ok(self
            .workflows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&workflow_id)
            .cloned())
    }
}

//! `engine` crate: graph model, ordering, dispatch, durable steps, status
//! broadcasting, and the orchestrator that ties them together.

pub mod config;
pub mod dag;
pub mod error;
pub mod executor;
pub mod models;
pub mod registry;
pub mod status;
pub mod step;
pub mod store;
pub mod validate;

pub use config::ExecutorConfig;
pub use dag::{topological_order, topological_sort, validate_dag};
pub use error::{EngineError, RunFailure};
pub use executor::{ExecutionResult, RunRequest, WorkflowExecutor};
pub use models::{Connection, Node, NodeType, Workflow};
pub use registry::{ExecutorRegistry, ExecutorServices};
pub use status::{NodeStatusWatch, StatusBoard, StatusBus, StatusEvent};
pub use step::{DurableSteps, MemoryStepStore, StepStore};
pub use store::{MemoryWorkflowStore, StoreError, WorkflowStore};
pub use validate::validate_workflow;

#[cfg(test)]
mod executor_tests;

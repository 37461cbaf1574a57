//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator:
//! 1. Loads the workflow snapshot (checkpointed as step `load-workflow`, so a
//!    resumed run sees the same graph).
//! 2. Validates the DAG and produces a topological ordering.
//! 3. Iterates through nodes in order, dispatching each via the registry.
//! 4. Threads the context from one node into the next.
//! 5. Stops at the first failure and reports the context built so far.
//!
//! Retries happen below this layer, inside [`DurableSteps`]; the executor
//! itself never re-runs a node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nodes::status::StatusPublisher;
use nodes::step::{run_step, ScopedSteps};
use nodes::{Context, NodeError, NodeParams, StatusFn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::dag::topological_order;
use crate::error::RunFailure;
use crate::models::Workflow;
use crate::registry::ExecutorRegistry;
use crate::step::{DurableSteps, StepStore};
use crate::store::WorkflowStore;
use crate::EngineError;

/// Step name under which the loaded snapshot is checkpointed.
pub const LOAD_WORKFLOW_STEP: &str = "load-workflow";

// ---------------------------------------------------------------------------
// Run input / output
// ---------------------------------------------------------------------------

/// Request to run one workflow once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Namespaces the run's steps. Re-submitting the same id resumes.
    pub run_id: Uuid,
    pub workflow_id: Uuid,
    /// Owner on whose behalf credentials are resolved.
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_data: Option<Value>,
}

impl RunRequest {
    pub fn new(workflow_id: Uuid, user_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_id,
            user_id: user_id.into(),
            initial_data: None,
        }
    }

    pub fn with_initial_data(mut self, data: Value) -> Self {
        self.initial_data = Some(data);
        self
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }
}

/// The result of running a full workflow.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub run_id: Uuid,
    pub workflow_id: Uuid,
    /// Final context after the last node.
    pub context: Context,
    /// Node ids in the order they ran.
    pub executed: Vec<String>,
}

/// Orchestrator state, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunPhase {
    LoadingGraph,
    Sorting,
    Executing,
    Succeeded,
    Failed,
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Stateless orchestrator; one instance serves any number of runs.
pub struct WorkflowExecutor {
    store: Arc<dyn WorkflowStore>,
    registry: ExecutorRegistry,
    steps: Arc<dyn StepStore>,
    publisher: Arc<dyn StatusPublisher>,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        registry: ExecutorRegistry,
        steps: Arc<dyn StepStore>,
        publisher: Arc<dyn StatusPublisher>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            registry,
            steps,
            publisher,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Run the workflow and return the final context.
    ///
    /// # Errors
    /// A [`RunFailure`] carrying the cause, the failing node (if any) and
    /// the context as it stood when the run stopped.
    #[instrument(
        skip(self, request),
        fields(run_id = %request.run_id, workflow_id = %request.workflow_id)
    )]
    pub async fn run(&self, request: RunRequest) -> Result<ExecutionResult, RunFailure> {
        let RunRequest {
            run_id,
            workflow_id,
            user_id,
            initial_data,
        } = request;

        let fail = |error: EngineError, failed_node: Option<&str>, context: Context| {
            error!(phase = %RunPhase::Failed, node_id = failed_node, error = %error, "run failed");
            RunFailure {
                run_id,
                error,
                failed_node: failed_node.map(str::to_owned),
                context,
            }
        };

        let Some(mut context) = Context::from_value(initial_data.unwrap_or(Value::Null)) else {
            return Err(fail(EngineError::InvalidInitialData, None, Context::new()));
        };

        let steps = DurableSteps::new(self.steps.clone(), run_id, self.config.clone());

        // ------------------------------------------------------------------
        // Load the snapshot.
        // ------------------------------------------------------------------
        info!(phase = %RunPhase::LoadingGraph, "loading workflow");
        let workflow = match self.load_workflow(&steps, workflow_id).await {
            Ok(workflow) => workflow,
            Err(err) => return Err(fail(err, None, context)),
        };

        // ------------------------------------------------------------------
        // Sort.
        // ------------------------------------------------------------------
        info!(phase = %RunPhase::Sorting, nodes = workflow.nodes.len(), "ordering nodes");
        let order = match topological_order(&workflow.nodes, &workflow.connections) {
            Ok(order) => order,
            Err(err) => return Err(fail(err, None, context)),
        };

        // ------------------------------------------------------------------
        // Execute nodes sequentially.
        // ------------------------------------------------------------------
        let ordered: Vec<_> = order.iter().map(|&i| &workflow.nodes[i]).collect();
        info!(
            phase = %RunPhase::Executing,
            order = ?ordered.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            "executing nodes"
        );
        let publish = StatusFn::new(self.publisher.clone(), run_id);
        let mut executed = Vec::with_capacity(order.len());

        for (position, node) in ordered.into_iter().enumerate() {
            let executor = match self.registry.resolve(node) {
                Ok(executor) => executor,
                Err(err) => return Err(fail(err, Some(node.id.as_str()), context)),
            };

            info!(
                phase = %RunPhase::Executing,
                node_id = %node.id,
                node_type = %node.node_type,
                position,
                "executing node"
            );

            let scoped = ScopedSteps::new(&steps, &node.id);
            let params = NodeParams {
                data: &node.data,
                node_id: &node.id,
                context: context.clone(),
                user_id: &user_id,
                step: &scoped,
                publish: &publish,
            };

            match executor.execute(params).await {
                Ok(next) => {
                    context = next;
                    executed.push(node.id.clone());
                }
                Err(source) => {
                    let err = EngineError::Node {
                        node_id: node.id.clone(),
                        source,
                    };
                    return Err(fail(err, Some(node.id.as_str()), context));
                }
            }
        }

        info!(phase = %RunPhase::Succeeded, executed = executed.len(), "run succeeded");

        Ok(ExecutionResult {
            run_id,
            workflow_id,
            context,
            executed,
        })
    }

    async fn load_workflow(
        &self,
        steps: &DurableSteps,
        workflow_id: Uuid,
    ) -> Result<Workflow, EngineError> {
        let store = &self.store;
        let missing = AtomicBool::new(false);
        let missing_flag = &missing;

        let loaded = run_step(steps, LOAD_WORKFLOW_STEP, move || async move {
            match store.load_workflow(workflow_id).await {
                Ok(Some(workflow)) => Ok(workflow),
                Ok(None) => {
                    missing_flag.store(true, Ordering::SeqCst);
                    Err(NodeError::fatal(format!("workflow {workflow_id} not found")))
                }
                Err(err) => Err(NodeError::transient(err.to_string())),
            }
        })
        .await;

        loaded.map_err(|err| {
            if missing.load(Ordering::SeqCst) {
                EngineError::WorkflowNotFound(workflow_id)
            } else {
                EngineError::Store(err.to_string())
            }
        })
    }
}

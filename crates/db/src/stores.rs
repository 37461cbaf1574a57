//! Postgres-backed implementations of the engine's storage seams.

use async_trait::async_trait;
use engine::{validate_workflow, Connection, Node, StepStore, StoreError, Workflow, WorkflowStore};
use nodes::credentials::{Credential, CredentialStore, CredentialType};
use nodes::{NodeError, NodeResult};
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::SaveError;
use crate::models::{ConnectionRow, CredentialRow, NodeRow, WorkflowRow};
use crate::repository::{credentials, steps, workflows};
use crate::{DbError, DbPool};

// ---------------------------------------------------------------------------
// Row <-> domain mapping
// ---------------------------------------------------------------------------

pub(crate) fn node_from_row(row: NodeRow) -> Result<Node, DbError> {
    let position = match row.position {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            serde_json::from_value(value)
                .map_err(|e| DbError::corrupt("nodes", format!("node '{}': bad position: {e}", row.id)))?,
        ),
    };
    Ok(Node {
        id: row.id,
        node_type: row.node_type,
        name: row.name,
        position,
        data: row.data,
    })
}

pub(crate) fn node_to_row(workflow_id: Uuid, ordinal: usize, node: &Node) -> Result<NodeRow, DbError> {
    let position = node
        .position
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| DbError::corrupt("nodes", e.to_string()))?;
    Ok(NodeRow {
        workflow_id,
        id: node.id.clone(),
        node_type: node.node_type.clone(),
        name: node.name.clone(),
        position,
        data: node.data.clone(),
        ordinal: i32::try_from(ordinal).map_err(|e| DbError::corrupt("nodes", e.to_string()))?,
    })
}

pub(crate) fn connection_from_row(row: ConnectionRow) -> Connection {
    Connection {
        id: row.id,
        from_node_id: row.from_node_id,
        to_node_id: row.to_node_id,
        from_output: row.from_output,
        to_input: row.to_input,
    }
}

pub(crate) fn connection_to_row(workflow_id: Uuid, connection: &Connection) -> ConnectionRow {
    ConnectionRow {
        workflow_id,
        id: connection.id.clone(),
        from_node_id: connection.from_node_id.clone(),
        to_node_id: connection.to_node_id.clone(),
        from_output: connection.from_output.clone(),
        to_input: connection.to_input.clone(),
    }
}

pub(crate) fn credential_from_row(row: CredentialRow) -> Result<Credential, DbError> {
    let kind: CredentialType = row
        .credential_type
        .parse()
        .map_err(|message: String| DbError::corrupt("credentials", message))?;
    Ok(Credential {
        id: row.id,
        owner_id: row.owner_id,
        kind,
        value: row.value,
    })
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

/// Workflow snapshots stored in the `workflows`, `nodes` and `connections`
/// tables.
#[derive(Debug, Clone)]
pub struct PgWorkflowStore {
    pool: DbPool,
}

impl PgWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Validate `workflow` and persist it, replacing any previous graph.
    ///
    /// Returns the execution order the graph will run in.
    #[instrument(skip(self, workflow), fields(workflow_id = %workflow.id))]
    pub async fn save_workflow(&self, workflow: &Workflow) -> Result<Vec<String>, SaveError> {
        let order = validate_workflow(workflow).map_err(SaveError::Invalid)?;

        let header = WorkflowRow {
            id: workflow.id,
            name: workflow.name.clone(),
            owner_id: workflow.owner_id.clone(),
            created_at: workflow.created_at,
            updated_at: workflow.created_at,
        };
        let nodes = workflow
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| node_to_row(workflow.id, i, node))
            .collect::<Result<Vec<_>, _>>()?;
        let connections: Vec<_> = workflow
            .connections
            .iter()
            .map(|c| connection_to_row(workflow.id, c))
            .collect();

        workflows::replace_graph(&self.pool, &header, &nodes, &connections).await?;
        debug!(nodes = nodes.len(), connections = connections.len(), "workflow saved");
        Ok(order)
    }

    async fn fetch(&self, workflow_id: Uuid) -> Result<Option<Workflow>, DbError> {
        let header = match workflows::get_workflow(&self.pool, workflow_id).await {
            Ok(header) => header,
            Err(DbError::NotFound) => return Ok(None),
            Err(err) => return Err(err),
        };
        let nodes = workflows::list_nodes(&self.pool, workflow_id)
            .await?
            .into_iter()
            .map(node_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let connections = workflows::list_connections(&self.pool, workflow_id)
            .await?
            .into_iter()
            .map(connection_from_row)
            .collect();

        Ok(Some(Workflow {
            id: header.id,
            name: header.name,
            owner_id: header.owner_id,
            nodes,
            connections,
            created_at: header.created_at,
        }))
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn load_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>, StoreError> {
        Ok(self.fetch(workflow_id).await?)
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: DbPool,
}

impl PgCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get_credential(&self, id: &str, owner_id: &str) -> NodeResult<Option<Credential>> {
        let row = credentials::get_credential(&self.pool, id, owner_id).await?;
        match row {
            None => Ok(None),
            Some(row) => credential_from_row(row)
                .map(Some)
                .map_err(|e| NodeError::credential(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Step checkpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgStepStore {
    pool: DbPool,
}

impl PgStepStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StepStore for PgStepStore {
    async fn load(&self, run_id: Uuid, step: &str) -> Result<Option<Value>, StoreError> {
        let row = steps::load_step(&self.pool, run_id, step).await?;
        Ok(row.map(|r| r.output))
    }

    async fn save(&self, run_id: Uuid, step: &str, output: &Value) -> Result<(), StoreError> {
        steps::save_step(&self.pool, run_id, step, output).await?;
        Ok(())
    }
}

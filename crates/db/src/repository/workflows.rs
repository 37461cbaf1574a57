//! Workflow graph operations.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ConnectionRow, NodeRow, WorkflowRow};
use crate::DbError;

/// Fetch a single workflow header by its primary key.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    sqlx::query_as::<_, WorkflowRow>(
        "SELECT id, name, owner_id, created_at, updated_at FROM workflows WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Return all workflows owned by `owner_id`, newest first.
pub async fn list_workflows(pool: &PgPool, owner_id: &str) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRow>(
        r#"
        SELECT id, name, owner_id, created_at, updated_at
        FROM workflows
        WHERE owner_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Permanently delete a workflow and its graph.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_workflow(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Nodes of `workflow_id` in listing order.
pub async fn list_nodes(pool: &PgPool, workflow_id: Uuid) -> Result<Vec<NodeRow>, DbError> {
    let rows = sqlx::query_as::<_, NodeRow>(
        r#"
        SELECT workflow_id, id, type, name, position, data, ordinal
        FROM nodes
        WHERE workflow_id = $1
        ORDER BY ordinal ASC
        "#,
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn list_connections(
    pool: &PgPool,
    workflow_id: Uuid,
) -> Result<Vec<ConnectionRow>, DbError> {
    let rows = sqlx::query_as::<_, ConnectionRow>(
        r#"
        SELECT workflow_id, id, from_node_id, to_node_id, from_output, to_input
        FROM connections
        WHERE workflow_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Insert or update the workflow header and replace its whole graph.
///
/// Runs in one transaction: readers see either the old graph or the new one.
pub async fn replace_graph(
    pool: &PgPool,
    workflow: &WorkflowRow,
    nodes: &[NodeRow],
    connections: &[ConnectionRow],
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO workflows (id, name, owner_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name, owner_id = EXCLUDED.owner_id, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(workflow.id)
    .bind(&workflow.name)
    .bind(&workflow.owner_id)
    .bind(workflow.created_at)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    // Connections cascade with their nodes.
    sqlx::query("DELETE FROM nodes WHERE workflow_id = $1")
        .bind(workflow.id)
        .execute(&mut *tx)
        .await?;

    for node in nodes {
        sqlx::query(
            r#"
            INSERT INTO nodes (workflow_id, id, type, name, position, data, ordinal)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(workflow.id)
        .bind(&node.id)
        .bind(&node.node_type)
        .bind(&node.name)
        .bind(&node.position)
        .bind(&node.data)
        .bind(node.ordinal)
        .execute(&mut *tx)
        .await?;
    }

    for connection in connections {
        sqlx::query(
            r#"
            INSERT INTO connections (workflow_id, id, from_node_id, to_node_id, from_output, to_input)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(workflow.id)
        .bind(&connection.id)
        .bind(&connection.from_node_id)
        .bind(&connection.to_node_id)
        .bind(&connection.from_output)
        .bind(&connection.to_input)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

//! Core domain models for the workflow engine.
//!
//! These types are the in-memory snapshot of a saved workflow: its nodes,
//! the connections between them, and the closed set of node types the
//! engine knows how to run. They serialise with the camelCase field names
//! used by the editor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// NodeType
// ---------------------------------------------------------------------------

/// Every node type the engine can dispatch.
///
/// Adding a type means one variant here, one arm in
/// [`ExecutorRegistry`](crate::registry::ExecutorRegistry), and one executor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    ManualTrigger,
    GoogleFormTrigger,
    StripeTrigger,
    HttpRequest,
    #[serde(rename = "OPENAI")]
    #[strum(serialize = "OPENAI")]
    OpenAi,
    Anthropic,
    Gemini,
    Discord,
    Slack,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Canvas coordinates; layout only, never read by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A single node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within this workflow (referenced by connections).
    pub id: String,
    /// Type tag as stored. Kept as a string so a snapshot containing a type
    /// this build does not know still loads and fails at dispatch.
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Opaque per-type configuration.
    #[serde(default)]
    pub data: Value,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType, data: Value) -> Self {
        let id = id.into();
        Self {
            name: node_type.to_string(),
            id,
            node_type: node_type.to_string(),
            position: None,
            data,
        }
    }

    /// The parsed type tag, or `None` when this build does not know it.
    pub fn kind(&self) -> Option<NodeType> {
        self.node_type.parse().ok()
    }

    /// The `variableName` this node writes to, if configured.
    pub fn variable_name(&self) -> Option<&str> {
        self.data
            .get("variableName")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

pub const DEFAULT_PORT: &str = "main";

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

/// Directed edge from one node's output port to another node's input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    #[serde(default = "default_port")]
    pub from_output: String,
    #[serde(default = "default_port")]
    pub to_input: String,
}

impl Connection {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from_node_id = from.into();
        let to_node_id = to.into();
        Self {
            id: format!("{from_node_id}->{to_node_id}"),
            from_node_id,
            to_node_id,
            from_output: default_port(),
            to_input: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete workflow snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner_id: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Convenience constructor for tests and the CLI.
    pub fn new(
        name: impl Into<String>,
        owner_id: impl Into<String>,
        nodes: Vec<Node>,
        connections: Vec<Connection>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner_id: owner_id.into(),
            nodes,
            connections,
            created_at: Utc::now(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn node_type_tags_match_storage() {
        assert_eq!(NodeType::HttpRequest.to_string(), "HTTP_REQUEST");
        assert_eq!(NodeType::OpenAi.to_string(), "OPENAI");
        assert_eq!("GOOGLE_FORM_TRIGGER".parse::<NodeType>(), Ok(NodeType::GoogleFormTrigger));
        assert_eq!(serde_json::to_value(NodeType::OpenAi).unwrap(), json!("OPENAI"));

        for kind in NodeType::iter() {
            assert_eq!(kind.to_string().parse::<NodeType>(), Ok(kind));
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.to_string()));
        }
    }

    #[test]
    fn unknown_type_survives_loading() {
        let node: Node = serde_json::from_value(json!({
            "id": "n1",
            "type": "INITIAL",
            "name": "placeholder"
        }))
        .unwrap();
        assert_eq!(node.kind(), None);
        assert_eq!(node.data, Value::Null);
    }

    #[test]
    fn connection_ports_default_to_main() {
        let conn: Connection = serde_json::from_value(json!({
            "id": "c1",
            "fromNodeId": "a",
            "toNodeId": "b"
        }))
        .unwrap();
        assert_eq!(conn.from_output, DEFAULT_PORT);
        assert_eq!(conn.to_input, DEFAULT_PORT);
    }

    #[test]
    fn hand_written_workflow_files_need_only_nodes() {
        let wf: Workflow = serde_json::from_value(json!({
            "nodes": [{ "id": "t", "type": "MANUAL_TRIGGER" }]
        }))
        .unwrap();
        assert_eq!(wf.nodes.len(), 1);
        assert!(wf.connections.is_empty());
        assert!(wf.owner_id.is_empty());
    }
}

//! Save-time validation of a workflow snapshot.
//!
//! The orchestrator only needs a sortable graph. Editors and the CLI call
//! [`validate_workflow`] before saving or enqueueing to catch everything else
//! a run would trip over: unknown node types, malformed variable names, and
//! two nodes writing the same context key.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::dag::validate_dag;
use crate::models::Workflow;
use crate::EngineError;

/// Whether `name` can be used as a context key from templates.
pub fn is_valid_variable_name(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("pattern is a valid regex"))
        .is_match(name)
}

/// Validate `workflow` for saving and return its execution order.
///
/// # Errors
/// Everything [`validate_dag`] reports, plus
/// - [`EngineError::Dispatch`] for a node type this build cannot run;
/// - [`EngineError::InvalidVariableName`] for a malformed `variableName`;
/// - [`EngineError::VariableNameCollision`] when two nodes share one.
pub fn validate_workflow(workflow: &Workflow) -> Result<Vec<String>, EngineError> {
    let order = validate_dag(workflow)?;

    let mut owners: HashMap<&str, &str> = HashMap::new();
    for node in &workflow.nodes {
        if node.kind().is_none() {
            return Err(EngineError::Dispatch {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            });
        }

        let Some(name) = node.variable_name() else {
            continue;
        };
        if !is_valid_variable_name(name) {
            return Err(EngineError::InvalidVariableName {
                node_id: node.id.clone(),
                name: name.to_string(),
            });
        }
        if let Some(first) = owners.insert(name, node.id.as_str()) {
            return Err(EngineError::VariableNameCollision {
                name: name.to_string(),
                first: first.to_string(),
                second: node.id.clone(),
            });
        }
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Connection, Node, NodeType};
    use serde_json::json;

    fn http(id: &str, var: &str) -> Node {
        Node::new(
            id,
            NodeType::HttpRequest,
            json!({ "variableName": var, "endpoint": "https://x.test", "method": "GET" }),
        )
    }

    #[test]
    fn variable_name_format() {
        for ok in ["resp", "_private", "$ref", "a1", "camelCase"] {
            assert!(is_valid_variable_name(ok), "{ok}");
        }
        for bad in ["", "1st", "has space", "dash-ed", "dot.ted"] {
            assert!(!is_valid_variable_name(bad), "{bad}");
        }
    }

    #[test]
    fn accepts_a_well_formed_workflow() {
        let wf = Workflow::new(
            "ok",
            "u1",
            vec![
                Node::new("t", NodeType::ManualTrigger, json!({})),
                http("a", "first"),
                http("b", "second"),
            ],
            vec![Connection::new("t", "a"), Connection::new("a", "b")],
        );
        assert_eq!(validate_workflow(&wf).unwrap(), vec!["t", "a", "b"]);
    }

    #[test]
    fn rejects_colliding_variable_names() {
        let wf = Workflow::new("dup", "u1", vec![http("a", "resp"), http("b", "resp")], vec![]);
        assert!(matches!(
            validate_workflow(&wf),
            Err(EngineError::VariableNameCollision { name, first, second })
                if name == "resp" && first == "a" && second == "b"
        ));
    }

    #[test]
    fn rejects_malformed_variable_names() {
        let wf = Workflow::new("bad", "u1", vec![http("a", "my-var")], vec![]);
        assert!(matches!(
            validate_workflow(&wf),
            Err(EngineError::InvalidVariableName { node_id, .. }) if node_id == "a"
        ));
    }

    #[test]
    fn rejects_unknown_node_types() {
        let mut node = http("a", "resp");
        node.node_type = "INITIAL".into();
        let wf = Workflow::new("bad", "u1", vec![node], vec![]);
        assert!(matches!(
            validate_workflow(&wf),
            Err(EngineError::Dispatch { node_type, .. }) if node_type == "INITIAL"
        ));
    }

    #[test]
    fn graph_errors_come_first() {
        let wf = Workflow::new(
            "cyclic",
            "u1",
            vec![http("a", "x"), http("b", "x")],
            vec![Connection::new("a", "b"), Connection::new("b", "a")],
        );
        assert!(matches!(validate_workflow(&wf), Err(EngineError::CycleDetected { .. })));
    }
}

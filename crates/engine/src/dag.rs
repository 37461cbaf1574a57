//! DAG validation and ordering: run this before persisting or executing a workflow.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the workflow.
//! 2. Every connection must reference valid node IDs (both ends).
//! 3. The directed graph must be acyclic (topological sort must succeed).
//!
//! Returns a topologically-sorted list of node IDs on success. Among nodes
//! that are ready at the same time, the one listed first in the workflow
//! goes first, so the order is a pure function of the input.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::models::{Connection, Node, Workflow};
use crate::EngineError;

/// Validate the workflow's DAG and return nodes in topological execution order.
pub fn validate_dag(workflow: &Workflow) -> Result<Vec<String>, EngineError> {
    topological_sort(&workflow.nodes, &workflow.connections)
}

/// Order `nodes` so that every connection's source precedes its target.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownNodeReference`] if a connection references a missing node.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic; no partial
///   order is returned.
pub fn topological_sort(
    nodes: &[Node],
    connections: &[Connection],
) -> Result<Vec<String>, EngineError> {
    Ok(topological_order(nodes, connections)?
        .into_iter()
        .map(|i| nodes[i].id.clone())
        .collect())
}

/// Like [`topological_sort`], but yields positions into `nodes`.
pub fn topological_order(
    nodes: &[Node],
    connections: &[Connection],
) -> Result<Vec<usize>, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique
    // -----------------------------------------------------------------------
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if index.insert(node.id.as_str(), i).is_some() {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate connection endpoints
    // -----------------------------------------------------------------------
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];
    // Parallel connections between the same pair count once.
    let mut seen_edges: HashSet<(usize, usize)> = HashSet::new();

    for conn in connections {
        let from = *index.get(conn.from_node_id.as_str()).ok_or_else(|| {
            EngineError::UnknownNodeReference {
                connection_id: conn.id.clone(),
                node_id: conn.from_node_id.clone(),
                side: "from",
            }
        })?;
        let to = *index.get(conn.to_node_id.as_str()).ok_or_else(|| {
            EngineError::UnknownNodeReference {
                connection_id: conn.id.clone(),
                node_id: conn.to_node_id.clone(),
                side: "to",
            }
        })?;

        if seen_edges.insert((from, to)) {
            adjacency[from].push(to);
            in_degree[to] += 1;
        }
    }

    // -----------------------------------------------------------------------
    // 3. Topological sort (Kahn's algorithm)
    // -----------------------------------------------------------------------
    // Min-heap on the original position gives the stable tie-break.
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut sorted: Vec<usize> = Vec::with_capacity(nodes.len());

    while let Some(Reverse(i)) = ready.pop() {
        sorted.push(i);

        for &next in &adjacency[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    // If we didn't visit every node the graph contains a cycle.
    if sorted.len() != nodes.len() {
        let remaining = nodes
            .iter()
            .zip(&in_degree)
            .filter(|(_, &d)| d > 0)
            .map(|(n, _)| n.id.clone())
            .collect();
        return Err(EngineError::CycleDetected { remaining });
    }

    Ok(sorted)
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeType;
    use serde_json::Value;

    fn make_node(id: &str) -> Node {
        Node::new(id, NodeType::HttpRequest, Value::Null)
    }

    fn edge(from: &str, to: &str) -> Connection {
        Connection::new(from, to)
    }

    fn make_workflow(nodes: Vec<Node>, connections: Vec<Connection>) -> Workflow {
        Workflow::new("test", "owner", nodes, connections)
    }

    fn position(sorted: &[String], id: &str) -> usize {
        sorted.iter().position(|s| s == id).unwrap()
    }

    #[test]
    fn valid_linear_dag_returns_sorted_order() {
        // A → B → C
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c")],
            vec![edge("a", "b"), edge("b", "c")],
        );

        let sorted = validate_dag(&workflow).expect("should be valid");
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn listing_order_does_not_override_edges() {
        // Listed C, B, A but wired A → B → C.
        let workflow = make_workflow(
            vec![make_node("c"), make_node("b"), make_node("a")],
            vec![edge("a", "b"), edge("b", "c")],
        );
        assert_eq!(validate_dag(&workflow).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn valid_diamond_dag() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c"), make_node("d")],
            vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
        );

        let sorted = validate_dag(&workflow).expect("should be valid");
        for conn in &workflow.connections {
            assert!(position(&sorted, &conn.from_node_id) < position(&sorted, &conn.to_node_id));
        }
        // Ties follow listing order.
        assert_eq!(sorted, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn disconnected_nodes_are_included_in_listing_order() {
        let workflow = make_workflow(
            vec![make_node("x"), make_node("a"), make_node("y"), make_node("b")],
            vec![edge("a", "b")],
        );
        assert_eq!(validate_dag(&workflow).unwrap(), vec!["x", "a", "y", "b"]);
    }

    #[test]
    fn sorting_is_deterministic() {
        let workflow = make_workflow(
            vec![make_node("e"), make_node("d"), make_node("c"), make_node("b"), make_node("a")],
            vec![edge("e", "a"), edge("d", "a"), edge("c", "b")],
        );
        let first = validate_dag(&workflow).unwrap();
        for _ in 0..10 {
            assert_eq!(validate_dag(&workflow).unwrap(), first);
        }
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let workflow = make_workflow(vec![make_node("a"), make_node("a")], vec![]);
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn edge_referencing_missing_node_is_rejected() {
        let workflow = make_workflow(vec![make_node("a")], vec![edge("a", "ghost")]);
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::UnknownNodeReference { node_id, side: "to", .. }) if node_id == "ghost"
        ));
    }

    #[test]
    fn two_node_cycle_is_detected() {
        // A → B → A
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b")],
            vec![edge("a", "b"), edge("b", "a")],
        );
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::CycleDetected { remaining }) if remaining == vec!["a", "b"]
        ));
    }

    #[test]
    fn cycle_downstream_of_valid_nodes_reports_only_the_cycle() {
        // R → A → B → C → A
        let workflow = make_workflow(
            vec![make_node("r"), make_node("a"), make_node("b"), make_node("c")],
            vec![edge("r", "a"), edge("a", "b"), edge("b", "c"), edge("c", "a")],
        );
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::CycleDetected { remaining }) if remaining == vec!["a", "b", "c"]
        ));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let workflow = make_workflow(vec![make_node("a")], vec![edge("a", "a")]);
        assert!(matches!(validate_dag(&workflow), Err(EngineError::CycleDetected { .. })));
    }

    #[test]
    fn single_node_no_edges_is_valid() {
        let workflow = make_workflow(vec![make_node("solo")], vec![]);
        let sorted = validate_dag(&workflow).expect("single node should be valid");
        assert_eq!(sorted, vec!["solo"]);
    }

    #[test]
    fn empty_workflow_sorts_to_nothing() {
        assert!(topological_sort(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn order_positions_point_back_into_the_node_list() {
        let nodes = vec![make_node("c"), make_node("a"), make_node("b")];
        let connections = vec![edge("a", "c"), edge("b", "a")];
        assert_eq!(topological_order(&nodes, &connections).unwrap(), vec![2, 1, 0]);
        assert_eq!(topological_sort(&nodes, &connections).unwrap(), vec!["b", "a", "c"]);
    }
}

//! Flow Validation
//!
//! Structural checks run once before a flow is executed:
//! - Node field validation (ids, types)
//! - Reference integrity of every edge
//! - Cycle detection over the full edge set, `onError` edges included
//!
//! Intentional repetition must be expressed through `foreach`/`while`
//! subflows, never through graph cycles.

use std::collections::HashSet;

use log::{debug, info, warn};

use super::model::{Edge, Flow, Node};
use crate::error::ValidationError;

/// Node types whose `subflow` parameter must name a declared subflow.
const CONTROL_KINDS: &[&str] = &["foreach", "while"];

/// DFS node colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Validates a single node's fields.
fn validate_node(node: &Node) -> Result<(), ValidationError> {
    if node.id.trim().is_empty() {
        return Err(ValidationError::EmptyNodeId);
    }

    if node.kind.trim().is_empty() {
        return Err(ValidationError::EmptyNodeType(node.id.clone()));
    }

    Ok(())
}

/// Validates one node/edge graph.
///
/// Checks, in order:
/// 1. The graph has at least one node (unless `allow_empty`)
/// 2. Every node has an id and a type, and ids are unique
/// 3. Every edge references existing nodes
/// 4. The edge set, including `onError` edges, is acyclic
pub fn validate_graph(
    nodes: &[Node],
    edges: &[Edge],
    allow_empty: bool,
) -> Result<(), ValidationError> {
    if nodes.is_empty() {
        return if allow_empty {
            Ok(())
        } else {
            Err(ValidationError::EmptyFlow)
        };
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in nodes {
        validate_node(node)?;
        if !seen_ids.insert(node.id.as_str()) {
            return Err(ValidationError::DuplicateNodeId(node.id.clone()));
        }
    }

    for edge in edges {
        for endpoint in [&edge.from, &edge.to] {
            if !seen_ids.contains(endpoint.as_str()) {
                return Err(ValidationError::InvalidEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    missing: endpoint.clone(),
                });
            }
        }
    }

    detect_cycle(nodes, edges)
}

/// Validates the top-level graph and every subflow.
pub fn validate_flow(flow: &Flow) -> Result<(), ValidationError> {
    info!(
        "Validating flow '{}' with {} nodes, {} edges",
        flow.id,
        flow.nodes.len(),
        flow.edges.len()
    );

    validate_graph(&flow.nodes, &flow.edges, false)?;

    for (name, subflow) in &flow.subflows {
        debug!("Validating subflow '{}'", name);
        validate_graph(&subflow.nodes, &subflow.edges, true)?;
    }

    Ok(())
}

/// Three-color depth-first search over all edges.
///
/// Iterative so that long recorded flows cannot overflow the stack.
fn detect_cycle(nodes: &[Node], edges: &[Edge]) -> Result<(), ValidationError> {
    let index: std::collections::HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for edge in edges {
        let ends = (index.get(edge.from.as_str()), index.get(edge.to.as_str()));
        if let (Some(&from), Some(&to)) = ends {
            adjacency[from].push(to);
        }
    }

    let mut color = vec![Color::White; nodes.len()];

    for root in 0..nodes.len() {
        if color[root] != Color::White {
            continue;
        }

        // (node, position of the next successor to visit)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        color[root] = Color::Gray;

        while let Some((current, cursor)) = stack.last_mut() {
            let current = *current;
            if let Some(&next) = adjacency[current].get(*cursor) {
                *cursor += 1;
                match color[next] {
                    Color::Gray => return Err(ValidationError::Cycle(nodes[next].id.clone())),
                    Color::White => {
                        color[next] = Color::Gray;
                        stack.push((next, 0));
                    }
                    Color::Black => {}
                }
            } else {
                color[current] = Color::Black;
                stack.pop();
            }
        }
    }

    Ok(())
}

/// Non-fatal review of a flow, returning human-readable findings.
///
/// Useful when loading flows to surface suspicious structure early.
pub fn quick_validate(flow: &Flow) -> Vec<String> {
    let mut findings = Vec::new();

    if flow.nodes.is_empty() {
        findings.push("Flow has no nodes".to_string());
        return findings;
    }

    let node_ids: HashSet<_> = flow.nodes.iter().map(|n| n.id.as_str()).collect();

    let all_nodes = flow
        .nodes
        .iter()
        .chain(flow.subflows.values().flat_map(|s| s.nodes.iter()));

    for node in all_nodes {
        if CONTROL_KINDS.contains(&node.kind.as_str()) {
            match node.params.get("subflow").and_then(|v| v.as_str()) {
                Some(name) if flow.subflows.contains_key(name) => {}
                Some(name) => findings.push(format!(
                    "Node '{}': references unknown subflow '{}'",
                    node.id, name
                )),
                None => findings.push(format!("Node '{}': missing 'subflow' parameter", node.id)),
            }
        }
    }

    for edge in &flow.edges {
        if !node_ids.contains(edge.from.as_str()) || !node_ids.contains(edge.to.as_str()) {
            findings.push(format!(
                "Edge {} -> {}: references unknown node",
                edge.from, edge.to
            ));
        }
    }

    let mut seen_error_sources = HashSet::new();
    for edge in flow.edges.iter().filter(|e| e.is_on_error()) {
        if !seen_error_sources.insert(edge.from.as_str()) {
            findings.push(format!(
                "Node '{}': has more than one onError edge; only the first is used",
                edge.from
            ));
        }
    }

    let declared: HashSet<_> = flow.variables.iter().map(|v| v.key.as_str()).collect();
    if declared.len() != flow.variables.len() {
        findings.push("Flow declares the same variable more than once".to_string());
    }

    for finding in &findings {
        warn!("{}", finding);
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::model::{Subflow, VariableDef};
    use serde_json::json;

    fn linear_flow() -> Flow {
        Flow::new("f", "linear")
            .with_node(Node::new("a", "click"))
            .with_node(Node::new("b", "click"))
            .with_node(Node::new("c", "click"))
            .with_edge(Edge::new("a", "b"))
            .with_edge(Edge::new("b", "c"))
    }

    #[test]
    fn test_valid_flow() {
        assert!(validate_flow(&linear_flow()).is_ok());
    }

    #[test]
    fn test_empty_flow() {
        let flow = Flow::new("f", "empty");
        assert_eq!(validate_flow(&flow), Err(ValidationError::EmptyFlow));
    }

    #[test]
    fn test_duplicate_ids() {
        let flow = Flow::new("f", "dup")
            .with_node(Node::new("same", "click"))
            .with_node(Node::new("same", "fill"));

        assert_eq!(
            validate_flow(&flow),
            Err(ValidationError::DuplicateNodeId("same".to_string()))
        );
    }

    #[test]
    fn test_empty_type() {
        let flow = Flow::new("f", "f").with_node(Node::new("a", ""));
        assert!(matches!(
            validate_flow(&flow),
            Err(ValidationError::EmptyNodeType(_))
        ));
    }

    #[test]
    fn test_invalid_edge_reference() {
        let flow = linear_flow().with_edge(Edge::new("c", "ghost"));
        match validate_flow(&flow) {
            Err(ValidationError::InvalidEdge { missing, .. }) => assert_eq!(missing, "ghost"),
            other => panic!("Expected InvalidEdge, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_through_default_edges() {
        let flow = linear_flow().with_edge(Edge::new("c", "a"));
        assert!(matches!(validate_flow(&flow), Err(ValidationError::Cycle(_))));
    }

    #[test]
    fn test_cycle_through_on_error_edge() {
        let flow = linear_flow().with_edge(Edge::on_error("c", "a"));
        assert!(matches!(validate_flow(&flow), Err(ValidationError::Cycle(_))));
    }

    #[test]
    fn test_self_loop() {
        let flow = Flow::new("f", "f")
            .with_node(Node::new("a", "click"))
            .with_edge(Edge::labeled("a", "a", "again"));
        assert_eq!(
            validate_flow(&flow),
            Err(ValidationError::Cycle("a".to_string()))
        );
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let flow = Flow::new("f", "diamond")
            .with_node(Node::new("a", "click"))
            .with_node(Node::new("b", "click"))
            .with_node(Node::new("c", "click"))
            .with_node(Node::new("d", "click"))
            .with_edge(Edge::labeled("a", "b", "true"))
            .with_edge(Edge::labeled("a", "c", "false"))
            .with_edge(Edge::new("b", "d"))
            .with_edge(Edge::on_error("c", "d"));
        assert!(validate_flow(&flow).is_ok());
    }

    #[test]
    fn test_subflow_validated() {
        let flow = linear_flow().with_subflow(
            "body",
            Subflow::new(
                vec![Node::new("x", "click"), Node::new("y", "click")],
                vec![Edge::new("x", "y"), Edge::new("y", "x")],
            ),
        );
        assert!(matches!(validate_flow(&flow), Err(ValidationError::Cycle(_))));
    }

    #[test]
    fn test_empty_subflow_allowed() {
        let flow = linear_flow().with_subflow("noop", Subflow::default());
        assert!(validate_flow(&flow).is_ok());
    }

    #[test]
    fn test_quick_validate_unknown_subflow() {
        let flow = Flow::new("f", "f")
            .with_node(Node::new("loop", "foreach").with_param("subflow", json!("missing")));

        let findings = quick_validate(&flow);
        assert!(findings.iter().any(|f| f.contains("unknown subflow")));
    }

    #[test]
    fn test_quick_validate_duplicate_on_error() {
        let flow = linear_flow()
            .with_edge(Edge::on_error("a", "c"))
            .with_edge(Edge::on_error("a", "b"));

        let findings = quick_validate(&flow);
        assert!(findings.iter().any(|f| f.contains("more than one onError")));
    }

    #[test]
    fn test_quick_validate_duplicate_variables() {
        let flow = linear_flow()
            .with_variable(VariableDef::new("x"))
            .with_variable(VariableDef::new("x"));

        let findings = quick_validate(&flow);
        assert!(findings.iter().any(|f| f.contains("same variable")));
    }

    #[test]
    fn test_quick_validate_clean() {
        assert!(quick_validate(&linear_flow()).is_empty());
    }
}

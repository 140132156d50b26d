//! Graph Indexing
//!
//! Adjacency indices built once per graph so traversal never rescans the
//! flat node and edge lists.

use std::collections::{HashMap, VecDeque};

use log::debug;

use super::model::{Edge, Node, ON_ERROR_LABEL};
use crate::error::ValidationError;

/// Read-only index over a node/edge graph.
#[derive(Debug)]
pub struct FlowGraph<'a> {
    nodes: &'a [Node],
    edges: &'a [Edge],
    index: HashMap<&'a str, usize>,
    outgoing: HashMap<&'a str, Vec<usize>>,
}

impl<'a> FlowGraph<'a> {
    /// Indexes nodes by id and edges by source.
    ///
    /// When ids repeat, the first declaration wins; the validator rejects
    /// such graphs before they are executed.
    pub fn new(nodes: &'a [Node], edges: &'a [Edge]) -> Self {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            index.entry(node.id.as_str()).or_insert(i);
        }

        let mut outgoing: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.from.as_str()).or_default().push(i);
        }

        Self {
            nodes,
            edges,
            index,
            outgoing,
        }
    }

    pub fn nodes(&self) -> &'a [Node] {
        self.nodes
    }

    pub fn edges(&self) -> &'a [Edge] {
        self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&'a Node> {
        self.position(id).map(|i| &self.nodes[i])
    }

    /// Outgoing edges of a node in declaration order.
    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &'a Edge> + '_ {
        let edges = self.edges;
        self.outgoing
            .get(id)
            .into_iter()
            .flat_map(move |indices| indices.iter().map(move |&i| &edges[i]))
    }

    /// Picks the node traversal starts from.
    ///
    /// An explicit id wins when it exists. Otherwise the unique node with
    /// no incoming non-`onError` edge is used, falling back to the first
    /// declared node.
    pub fn start_node(&self, explicit: Option<&str>) -> Option<&'a Node> {
        if let Some(id) = explicit {
            match self.node(id) {
                Some(node) => return Some(node),
                None => debug!("Requested start node '{}' not found, ignoring", id),
            }
        }

        let mut roots = self
            .nodes
            .iter()
            .filter(|node| {
                !self
                    .edges
                    .iter()
                    .any(|e| !e.is_on_error() && e.to == node.id)
            });

        match (roots.next(), roots.next()) {
            (Some(root), None) => Some(root),
            _ => self.nodes.first(),
        }
    }

    /// Edge to follow after a successful step.
    ///
    /// Prefers an edge whose label equals `label`, then falls back to the
    /// unlabeled edge. `onError` edges are never taken on success.
    pub fn next_edge(&self, from: &str, label: &str) -> Option<&'a Edge> {
        let candidates: Vec<&'a Edge> = self.outgoing(from).filter(|e| !e.is_on_error()).collect();

        candidates
            .iter()
            .find(|e| e.effective_label() == label)
            .or_else(|| candidates.iter().find(|e| e.label.is_none()))
            .or_else(|| candidates.iter().find(|e| e.is_default()))
            .copied()
    }

    /// The `onError` edge leaving a node, if any.
    pub fn error_edge(&self, from: &str) -> Option<&'a Edge> {
        self.outgoing(from)
            .find(|e| e.effective_label() == ON_ERROR_LABEL)
    }

    /// Orders nodes by their non-`onError` edges using Kahn's algorithm.
    ///
    /// Ties keep declaration order. Used by subflows, which run their
    /// nodes sequentially rather than by labels.
    pub fn topological_order(&self) -> Result<Vec<&'a Node>, ValidationError> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        for edge in self.edges.iter().filter(|e| !e.is_on_error()) {
            if let Some(i) = self.position(&edge.to) {
                in_degree[i] += 1;
            }
        }

        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| i)
            .collect();

        let mut sorted = Vec::with_capacity(self.nodes.len());

        while let Some(current) = queue.pop_front() {
            let node = &self.nodes[current];
            sorted.push(node);

            for edge in self.outgoing(&node.id).filter(|e| !e.is_on_error()) {
                if let Some(successor) = self.position(&edge.to) {
                    in_degree[successor] -= 1;
                    if in_degree[successor] == 0 {
                        queue.push_back(successor);
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            let stuck = in_degree
                .iter()
                .position(|d| *d > 0)
                .map(|i| self.nodes[i].id.clone())
                .unwrap_or_default();
            return Err(ValidationError::Cycle(stuck));
        }

        debug!(
            "Topological order: {:?}",
            sorted.iter().map(|n| &n.id).collect::<Vec<_>>()
        );
        Ok(sorted)
    }
}

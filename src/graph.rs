use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// Opaque vertex identifier. Node ids come straight from the instance file
/// and carry no meaning beyond identity.
pub type Node = i64;

/// An ordered pair of nodes keying every arc-indexed structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Arc {
    pub tail: Node,
    pub head: Node,
}

impl Arc {
    pub fn new(tail: Node, head: Node) -> Self {
        Self { tail, head }
    }
}

impl fmt::Display for Arc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.tail, self.head)
    }
}

/// An ordered node triple. Only the RLT formulation builder keys variables
/// by triples, and only while the model is being built.
pub type Triplet = (Node, Node, Node);

/// A directed, arc-weighted graph with adjacency indexed both by out-arcs
/// and in-arcs.
///
/// The graph is immutable for the lifetime of a query: callers build it
/// once and hand out shared references to any number of solver instances.
///
/// # Examples
/// ```
/// use elpp::graph::{Arc, DiGraph};
///
/// let mut g = DiGraph::new();
/// g.add_arc(1, 2, 3.0).unwrap();
/// g.add_arc(2, 3, 4.0).unwrap();
/// assert_eq!(g.num_nodes(), 3);
/// assert_eq!(g.cost(Arc::new(1, 2)), Some(3.0));
/// assert_eq!(g.out_neighbors(1), &[2]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DiGraph {
    nodes: Vec<Node>,
    arcs: Vec<Arc>,
    cost: HashMap<Arc, f64>,
    out_adj: HashMap<Node, Vec<Node>>,
    in_adj: HashMap<Node, Vec<Node>>,
}

impl DiGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node. Adding the same node twice is a no-op.
    pub fn add_node(&mut self, node: Node) {
        if !self.out_adj.contains_key(&node) {
            self.nodes.push(node);
            self.out_adj.insert(node, Vec::new());
            self.in_adj.insert(node, Vec::new());
        }
    }

    /// Adds an arc with its cost, registering endpoints as needed.
    ///
    /// Self-loops and duplicate arcs are rejected: an arc variable may exist
    /// for an (i, j) pair only if that pair occurs once in the input.
    pub fn add_arc(&mut self, tail: Node, head: Node, cost: f64) -> Result<()> {
        let arc = Arc::new(tail, head);
        if tail == head {
            return Err(Error::SelfLoop(arc));
        }
        if self.cost.contains_key(&arc) {
            return Err(Error::DuplicateArc(arc));
        }
        self.add_node(tail);
        self.add_node(head);
        self.out_adj.get_mut(&tail).unwrap().push(head);
        self.in_adj.get_mut(&head).unwrap().push(tail);
        self.cost.insert(arc, cost);
        self.arcs.push(arc);
        Ok(())
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Arcs in insertion order.
    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    pub fn cost(&self, arc: Arc) -> Option<f64> {
        self.cost.get(&arc).copied()
    }

    /// Per-arc costs, usable directly as an objective map.
    pub fn costs(&self) -> &HashMap<Arc, f64> {
        &self.cost
    }

    pub fn out_neighbors(&self, node: Node) -> &[Node] {
        self.out_adj.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn in_neighbors(&self, node: Node) -> &[Node] {
        self.in_adj.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_node(&self, node: Node) -> bool {
        self.out_adj.contains_key(&node)
    }

    pub fn contains_arc(&self, arc: Arc) -> bool {
        self.cost.contains_key(&arc)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.arcs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_query() {
        let mut g = DiGraph::new();
        g.add_arc(1, 2, 3.0).unwrap();
        g.add_arc(2, 3, 4.0).unwrap();
        g.add_arc(1, 3, 2.0).unwrap();

        assert_eq!(g.num_nodes(), 3);
        assert_eq!(g.num_arcs(), 3);
        assert_eq!(g.nodes(), &[1, 2, 3]);
        assert_eq!(g.out_neighbors(1), &[2, 3]);
        assert_eq!(g.in_neighbors(3), &[2, 1]);
        assert_eq!(g.cost(Arc::new(2, 3)), Some(4.0));
        assert!(g.contains_arc(Arc::new(1, 2)));
        assert!(!g.contains_arc(Arc::new(2, 1)));
    }

    #[test]
    fn test_isolated_node() {
        let mut g = DiGraph::new();
        g.add_node(7);
        g.add_arc(1, 2, 1.0).unwrap();

        assert_eq!(g.num_nodes(), 3);
        assert!(g.contains_node(7));
        assert!(g.out_neighbors(7).is_empty());
    }

    #[test]
    fn test_duplicate_arc_rejected() {
        let mut g = DiGraph::new();
        g.add_arc(1, 2, 1.0).unwrap();
        assert!(matches!(
            g.add_arc(1, 2, 5.0),
            Err(Error::DuplicateArc(_))
        ));
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut g = DiGraph::new();
        assert!(matches!(g.add_arc(4, 4, 1.0), Err(Error::SelfLoop(_))));
    }
}

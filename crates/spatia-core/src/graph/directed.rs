//! Generic directed graph with Kahn linearization.
//!
//! [`DirectedGraph`] is a build-time structure. It is assembled from the
//! connection table whenever an edit has to be validated or a plan has to be
//! built, and dropped afterwards; the runtime plan never points into it.
//!
//! Nodes are stored in insertion order behind an ordered key index. When
//! several nodes become ready at the same time during
//! [`make_linear`](DirectedGraph::make_linear), the one inserted first is
//! emitted first, so a given edit history always yields the same order.

#[cfg(not(feature = "std"))]
use alloc::{
    collections::{BTreeMap, BTreeSet},
    vec::Vec,
};
#[cfg(feature = "std")]
use std::collections::{BTreeMap, BTreeSet};

/// A node of a [`DirectedGraph`] with its adjacency lists.
#[derive(Debug, Clone)]
pub struct GraphNode<K> {
    key: K,
    /// Slot indices of upstream nodes, in edge insertion order.
    inputs: Vec<usize>,
    /// Slot indices of downstream nodes, in edge insertion order.
    outputs: Vec<usize>,
}

impl<K: Copy> GraphNode<K> {
    /// The key this node was registered under.
    #[inline]
    pub fn key(&self) -> K {
        self.key
    }

    /// Number of distinct upstream nodes.
    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Number of distinct downstream nodes.
    #[inline]
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }
}

/// Linearization failure.
///
/// `unresolved` holds every key that still had pending inputs when no more
/// nodes could be emitted: the nodes on a cycle and everything downstream of
/// it, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle<K> {
    /// Keys that could not be placed.
    pub unresolved: Vec<K>,
}

/// Adjacency-list graph over opaque `Copy + Ord` keys.
#[derive(Debug, Clone)]
pub struct DirectedGraph<K> {
    nodes: Vec<GraphNode<K>>,
    index: BTreeMap<K, usize>,
    edge_count: usize,
}

impl<K: Copy + Ord> Default for DirectedGraph<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Ord> DirectedGraph<K> {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: BTreeMap::new(),
            edge_count: 0,
        }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of distinct edges.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Registers `key`, returning its slot. Existing keys keep their slot.
    pub fn add_node(&mut self, key: K) -> usize {
        if let Some(&slot) = self.index.get(&key) {
            return slot;
        }
        let slot = self.nodes.len();
        self.nodes.push(GraphNode {
            key,
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        self.index.insert(key, slot);
        slot
    }

    /// Returns the node registered under `key`, if any.
    pub fn node(&self, key: K) -> Option<&GraphNode<K>> {
        self.index.get(&key).map(|&slot| &self.nodes[slot])
    }

    /// Returns `true` if `key` is registered.
    pub fn contains(&self, key: K) -> bool {
        self.index.contains_key(&key)
    }

    /// Adds an edge, registering both ends as needed.
    ///
    /// Duplicate edges are no-ops. Returns `true` if the edge is new.
    pub fn add_edge(&mut self, from: K, to: K) -> bool {
        let from = self.add_node(from);
        let to = self.add_node(to);
        if self.nodes[from].outputs.contains(&to) {
            return false;
        }
        self.nodes[from].outputs.push(to);
        self.nodes[to].inputs.push(from);
        self.edge_count += 1;
        true
    }

    /// Removes an edge. Returns `true` if it existed. Nodes stay registered.
    pub fn remove_edge(&mut self, from: K, to: K) -> bool {
        let (Some(&from), Some(&to)) = (self.index.get(&from), self.index.get(&to)) else {
            return false;
        };
        let Some(pos) = self.nodes[from].outputs.iter().position(|&s| s == to) else {
            return false;
        };
        self.nodes[from].outputs.remove(pos);
        self.nodes[to].inputs.retain(|&s| s != from);
        self.edge_count -= 1;
        true
    }

    /// Returns `true` if an edge `from → to` exists.
    pub fn contains_edge(&self, from: K, to: K) -> bool {
        match (self.index.get(&from), self.index.get(&to)) {
            (Some(&from), Some(&to)) => self.nodes[from].outputs.contains(&to),
            _ => false,
        }
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.nodes.iter().map(|n| n.key)
    }

    /// Upstream keys of `key`. Empty for unknown keys.
    pub fn inputs(&self, key: K) -> impl Iterator<Item = K> + '_ {
        self.node(key)
            .into_iter()
            .flat_map(move |n| n.inputs.iter().map(move |&s| self.nodes[s].key))
    }

    /// Downstream keys of `key`. Empty for unknown keys.
    pub fn outputs(&self, key: K) -> impl Iterator<Item = K> + '_ {
        self.node(key)
            .into_iter()
            .flat_map(move |n| n.outputs.iter().map(move |&s| self.nodes[s].key))
    }

    /// Orders every key so that each one comes after all of its inputs.
    ///
    /// Kahn's algorithm: nodes without pending inputs are emitted, their
    /// outgoing edges are retired, and successors whose inputs are all resolved
    /// become ready. Among ready nodes the earliest inserted goes first.
    ///
    /// Returns [`Cycle`] if some nodes can never become ready.
    pub fn make_linear(&self) -> Result<Vec<K>, Cycle<K>> {
        let mut pending: Vec<usize> = self.nodes.iter().map(|n| n.inputs.len()).collect();
        let mut ready: BTreeSet<usize> = pending
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count == 0)
            .map(|(slot, _)| slot)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(slot) = ready.pop_first() {
            order.push(self.nodes[slot].key);
            for &next in &self.nodes[slot].outputs {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() != self.nodes.len() {
            let unresolved = pending
                .iter()
                .enumerate()
                .filter(|&(_, &count)| count > 0)
                .map(|(slot, _)| self.nodes[slot].key)
                .collect();
            return Err(Cycle { unresolved });
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_linearizes_in_flow_order() {
        let mut g = DirectedGraph::new();
        g.add_edge(3u32, 1);
        g.add_edge(1, 2);
        assert_eq!(g.make_linear(), Ok(vec![3, 1, 2]));
    }

    #[test]
    fn test_diamond() {
        let mut g = DirectedGraph::new();
        g.add_edge('a', 'b');
        g.add_edge('a', 'c');
        g.add_edge('b', 'd');
        g.add_edge('c', 'd');
        let order = g.make_linear().unwrap();
        assert_eq!(order, vec!['a', 'b', 'c', 'd']);
    }

    #[test]
    fn test_ready_ties_follow_insertion_order() {
        let mut g = DirectedGraph::new();
        // 9 is inserted before 5, both are sources; 1 precedes 7 once ready
        g.add_edge(9u32, 1);
        g.add_edge(5, 1);
        g.add_node(7);
        assert_eq!(g.make_linear(), Ok(vec![9, 5, 1, 7]));
    }

    #[test]
    fn test_successor_released_late_keeps_its_slot_priority() {
        let mut g = DirectedGraph::new();
        g.add_edge(0u32, 1);
        g.add_node(2);
        // 1 becomes ready after 0 is emitted; 1 was inserted before 2
        assert_eq!(g.make_linear(), Ok(vec![0, 1, 2]));
    }

    #[test]
    fn test_cycle_reports_unresolved_nodes() {
        let mut g = DirectedGraph::new();
        g.add_edge(0u32, 1);
        g.add_edge(1, 2);
        g.add_edge(2, 1);
        g.add_edge(2, 3);
        let err = g.make_linear().unwrap_err();
        assert_eq!(err.unresolved, vec![1, 2, 3]);
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let mut g = DirectedGraph::new();
        g.add_edge(4u32, 4);
        assert!(g.make_linear().is_err());
    }

    #[test]
    fn test_add_edge_is_idempotent() {
        let mut g = DirectedGraph::new();
        assert!(g.add_edge(0u32, 1));
        assert!(!g.add_edge(0, 1));
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.node(1).unwrap().num_inputs(), 1);
    }

    #[test]
    fn test_remove_edge() {
        let mut g = DirectedGraph::new();
        g.add_edge(0u32, 1);
        g.add_edge(1, 0);
        assert!(g.make_linear().is_err());
        assert!(g.remove_edge(1, 0));
        assert!(!g.remove_edge(1, 0));
        assert!(!g.contains_edge(1, 0));
        assert_eq!(g.make_linear(), Ok(vec![0, 1]));
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn test_adjacency_views() {
        let mut g = DirectedGraph::new();
        g.add_edge(0u32, 2);
        g.add_edge(1, 2);
        assert_eq!(g.inputs(2).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(g.outputs(0).collect::<Vec<_>>(), vec![2]);
        assert_eq!(g.inputs(42).count(), 0);
        assert!(g.node(42).is_none());
    }

    #[test]
    fn test_empty_graph_linearizes_to_nothing() {
        let g: DirectedGraph<u32> = DirectedGraph::new();
        assert_eq!(g.make_linear(), Ok(vec![]));
    }
}

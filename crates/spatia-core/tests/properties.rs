//! Property-based tests for spatia-core topology.
//!
//! Random edge lists check that the connection table never admits a cycle,
//! that rejected edits leave it untouched, and that every built path respects
//! its connections and is deterministic.

use proptest::prelude::*;
use spatia_core::nodes::Gain;
use spatia_core::{Connection, ConnectionTable, DirectedGraph, NodeId, NodeKind, NodeTree, PathBuilder};
use spatia_core::Configuration;

const NODES: u32 = 8;

fn edges() -> impl Strategy<Value = Vec<(u32, u32)>> {
    prop::collection::vec((0..NODES, 0..NODES), 0..40)
}

fn tree_of_gains() -> (NodeTree, Vec<NodeId>) {
    let mut tree = NodeTree::new();
    let ids = (0..NODES)
        .map(|i| {
            tree.add(None, &format!("n{i}"), NodeKind::Processor(Box::new(Gain::new(1.0))))
                .unwrap()
        })
        .collect();
    (tree, ids)
}

/// Connects every edge the table accepts and returns the table.
fn table_from(edges: &[(u32, u32)], ids: &[NodeId]) -> ConnectionTable {
    let mut table = ConnectionTable::new();
    for &(a, b) in edges {
        let _ = table.connect(Connection::new(ids[a as usize], 0, ids[b as usize], 0));
    }
    table
}

fn position(order: &[NodeId], id: NodeId) -> usize {
    order.iter().position(|&n| n == id).unwrap()
}

proptest! {
    #[test]
    fn accepted_edges_always_linearize(edges in edges()) {
        let (mut tree, ids) = tree_of_gains();
        let table = table_from(&edges, &ids);

        prop_assert!(table.graph().make_linear().is_ok());

        let config = Configuration::new(48000, 8, 0, 0);
        let (_, report) = PathBuilder::new(config).build(&mut tree, &table).unwrap();
        for c in &table {
            prop_assert!(position(&report.order, c.from) < position(&report.order, c.to));
        }
    }

    #[test]
    fn rejected_edit_leaves_table_unchanged(edges in edges(), extra in (0..NODES, 0..NODES)) {
        let (_, ids) = tree_of_gains();
        let mut table = table_from(&edges, &ids);
        let before: Vec<Connection> = table.iter().copied().collect();
        let generation = table.generation();

        let c = Connection::new(ids[extra.0 as usize], 0, ids[extra.1 as usize], 0);
        let would_cycle = table.would_create_cycle(c.from, c.to);
        let already = table.contains(&c);
        match table.connect(c) {
            Ok(added) => {
                prop_assert!(!would_cycle);
                prop_assert_eq!(added, !already);
            }
            Err(_) => {
                prop_assert!(would_cycle);
                prop_assert_eq!(table.iter().copied().collect::<Vec<_>>(), before);
                prop_assert_eq!(table.generation(), generation);
            }
        }
    }

    #[test]
    fn connect_is_idempotent(edges in edges()) {
        let (_, ids) = tree_of_gains();
        let mut table = table_from(&edges, &ids);
        let len = table.len();
        for &(a, b) in &edges {
            let c = Connection::new(ids[a as usize], 0, ids[b as usize], 0);
            if table.contains(&c) {
                prop_assert_eq!(table.connect(c), Ok(false));
            }
        }
        prop_assert_eq!(table.len(), len);
    }

    #[test]
    fn building_twice_gives_same_order(edges in edges()) {
        let (mut tree, ids) = tree_of_gains();
        let table = table_from(&edges, &ids);
        let builder = PathBuilder::new(Configuration::new(48000, 8, 0, 0));
        let (first, _) = builder.build(&mut tree, &table).unwrap();
        let (second, _) = builder.build(&mut tree, &table).unwrap();
        prop_assert_eq!(first.order().collect::<Vec<_>>(), second.order().collect::<Vec<_>>());
    }

    #[test]
    fn raw_graph_cycles_are_reported(edges in edges()) {
        let mut graph = DirectedGraph::new();
        for &(a, b) in &edges {
            graph.add_edge(a, b);
        }
        match graph.make_linear() {
            Ok(order) => {
                prop_assert_eq!(order.len(), graph.len());
                for &(a, b) in &edges {
                    let pa = order.iter().position(|&k| k == a).unwrap();
                    let pb = order.iter().position(|&k| k == b).unwrap();
                    prop_assert!(pa < pb);
                }
            }
            Err(cycle) => prop_assert!(!cycle.unresolved.is_empty()),
        }
    }
}

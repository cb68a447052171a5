//! Topology layer: node identities, the authored connection table and the
//! build-time directed graph used to linearize it.
//!
//! # Architecture
//!
//! Three structures, each with one job:
//!
//! - [`NodeTree`]: the node arena. Owns every [`AudioNode`](crate::AudioNode)
//!   processor together with its parent link. Parent links only matter for
//!   transform inheritance; they never imply audio flow.
//! - [`ConnectionTable`]: the authored audio edges
//!   (`from/output → to/input × channels`). Every edit is validated by building
//!   a transient [`DirectedGraph`] over the current edges plus the proposed one
//!   and attempting [`make_linear`](DirectedGraph::make_linear). Rejected edits
//!   leave the table untouched.
//! - [`DirectedGraph`]: plain adjacency lists over opaque keys. It exists only
//!   while an edit is validated or a plan is built, then it is dropped.
//!
//! Both the tree and the table carry a `generation()` counter so an owner can
//! tell when a previously built [`DspPath`](crate::DspPath) went stale.
//!
//! # Example
//!
//! ```rust
//! use spatia_core::graph::{Connection, ConnectionTable, GraphError, NodeId};
//!
//! let osc = NodeId::from_raw(0);
//! let out = NodeId::from_raw(1);
//!
//! let mut table = ConnectionTable::new();
//! assert_eq!(table.connect(Connection::new(osc, 0, out, 0)), Ok(true));
//! // identical edits are no-ops
//! assert_eq!(table.connect(Connection::new(osc, 0, out, 0)), Ok(false));
//! // closing the loop is rejected
//! assert!(matches!(
//!     table.connect(Connection::new(out, 0, osc, 0)),
//!     Err(GraphError::CycleDetected { .. })
//! ));
//! assert_eq!(table.len(), 1);
//! ```

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

pub mod connection;
pub mod directed;
pub mod tree;

pub use connection::{Connection, ConnectionTable};
pub use directed::{Cycle, DirectedGraph, GraphNode};
pub use tree::{NodeKind, NodeTree, TreeNode};

/// Identifier of a node in the [`NodeTree`].
///
/// Ids are assigned sequentially by [`NodeTree::add`] and never reused within
/// a tree instance. Callers that allocate ids themselves (for example a control
/// thread mirroring a worker-owned tree) use [`NodeTree::insert`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Wraps a raw numeric identifier.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric identifier.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Errors raised by topology edits and plan building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The specified node does not exist in the tree.
    NodeNotFound(NodeId),
    /// A node with this id already exists.
    DuplicateNode(NodeId),
    /// Connecting `from` to `to` would close a loop.
    CycleDetected {
        /// Upstream end of the rejected edge.
        from: NodeId,
        /// Downstream end of the rejected edge.
        to: NodeId,
    },
    /// The connection itself is malformed (e.g. spans zero channels).
    InvalidConnection(String),
    /// Re-parenting would make a node its own ancestor.
    InvalidParent {
        /// Node being moved.
        node: NodeId,
        /// Requested parent.
        parent: NodeId,
    },
    /// The configuration cannot size a DSP path.
    InvalidConfiguration(String),
    /// Linearization failed while building a plan. Lists the unresolved nodes.
    Cycle(Vec<NodeId>),
}

impl core::fmt::Display for GraphError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NodeNotFound(id) => write!(f, "node {id} not found"),
            Self::DuplicateNode(id) => write!(f, "node {id} already exists"),
            Self::CycleDetected { from, to } => {
                write!(f, "connecting {from} to {to} would create a cycle")
            }
            Self::InvalidConnection(msg) => write!(f, "invalid connection: {msg}"),
            Self::InvalidParent { node, parent } => {
                write!(f, "{parent} cannot become the parent of {node}")
            }
            Self::InvalidConfiguration(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Cycle(nodes) => {
                write!(f, "graph contains a cycle through")?;
                for id in nodes {
                    write!(f, " {id}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for GraphError {}

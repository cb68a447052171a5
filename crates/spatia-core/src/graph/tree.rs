//! Node arena with parent links.
//!
//! The tree owns every processor. Parent links describe spatial nesting: a node
//! without its own transform inherits the matrix of its nearest ancestor that
//! has one. Audio flow is described separately by the
//! [`ConnectionTable`](super::ConnectionTable).

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, string::String, vec::Vec};

use super::{GraphError, NodeId};
use crate::node::AudioNode;

/// The role of a node in the tree.
pub enum NodeKind {
    /// A processing node (DSP, transform, or both).
    Processor(Box<dyn AudioNode>),
    /// Exposes the hardware input channels as its outputs.
    SystemInput,
    /// Sums its inputs into the hardware output channels.
    SystemOutput,
}

impl NodeKind {
    /// Short label used in plan dumps and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Processor(_) => "processor",
            Self::SystemInput => "system-input",
            Self::SystemOutput => "system-output",
        }
    }
}

impl core::fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// A node stored in the [`NodeTree`].
#[derive(Debug)]
pub struct TreeNode {
    id: NodeId,
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

impl TreeNode {
    /// The node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Human-readable name. Not required to be unique.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent node, or `None` for a root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The node's role.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Mutable access to the node's role.
    pub fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    /// The processor, if this is a processing node.
    pub fn processor(&self) -> Option<&dyn AudioNode> {
        match &self.kind {
            NodeKind::Processor(node) => Some(node.as_ref()),
            _ => None,
        }
    }

    /// Returns `true` if the node computes its own spatial transform.
    pub fn has_transform(&self) -> bool {
        self.processor().is_some_and(|p| p.has_transform())
    }
}

/// Arena of [`TreeNode`]s indexed by [`NodeId`].
#[derive(Debug, Default)]
pub struct NodeTree {
    nodes: Vec<Option<TreeNode>>,
    roots: Vec<NodeId>,
    len: usize,
    generation: u64,
}

impl NodeTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Edit counter, bumped by every structural change.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The id the next call to [`add`](Self::add) will assign.
    pub fn next_id(&self) -> NodeId {
        NodeId(self.nodes.len() as u32)
    }

    /// Adds a node under `parent` (or as a root) and returns its id.
    pub fn add(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<String>,
        kind: NodeKind,
    ) -> Result<NodeId, GraphError> {
        let id = self.next_id();
        self.insert(id, parent, name, kind)?;
        Ok(id)
    }

    /// Adds a node under a caller-chosen id.
    ///
    /// # Errors
    ///
    /// - [`GraphError::DuplicateNode`] if `id` is taken
    /// - [`GraphError::NodeNotFound`] if `parent` does not exist
    pub fn insert(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
        name: impl Into<String>,
        kind: NodeKind,
    ) -> Result<(), GraphError> {
        if self.contains(id) {
            return Err(GraphError::DuplicateNode(id));
        }
        if let Some(parent) = parent
            && !self.contains(parent)
        {
            return Err(GraphError::NodeNotFound(parent));
        }

        let slot = id.0 as usize;
        if self.nodes.len() <= slot {
            self.nodes.resize_with(slot + 1, || None);
        }
        self.nodes[slot] = Some(TreeNode {
            id,
            name: name.into(),
            parent,
            children: Vec::new(),
            kind,
        });
        match parent {
            Some(parent) => self.slot_mut(parent).children.push(id),
            None => self.roots.push(id),
        }
        self.len += 1;
        self.generation += 1;
        Ok(())
    }

    /// Removes `id` and its whole subtree. Returns the removed ids, parents
    /// before children.
    pub fn remove(&mut self, id: NodeId) -> Result<Vec<NodeId>, GraphError> {
        let parent = self.get(id).ok_or(GraphError::NodeNotFound(id))?.parent;
        match parent {
            Some(parent) => self.slot_mut(parent).children.retain(|&c| c != id),
            None => self.roots.retain(|&r| r != id),
        }

        let mut removed = Vec::new();
        self.collect_subtree(id, &mut removed);
        for &gone in &removed {
            self.nodes[gone.0 as usize] = None;
        }
        self.len -= removed.len();
        self.generation += 1;
        Ok(removed)
    }

    /// Moves `id` under `parent` (or to the root level).
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidParent`] if `parent` is `id` or one of its
    /// descendants.
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<(), GraphError> {
        let old = self.get(id).ok_or(GraphError::NodeNotFound(id))?.parent;
        if let Some(parent) = parent {
            if !self.contains(parent) {
                return Err(GraphError::NodeNotFound(parent));
            }
            if parent == id || self.ancestors(parent).any(|a| a == id) {
                return Err(GraphError::InvalidParent { node: id, parent });
            }
        }
        if old == parent {
            return Ok(());
        }

        match old {
            Some(old) => self.slot_mut(old).children.retain(|&c| c != id),
            None => self.roots.retain(|&r| r != id),
        }
        match parent {
            Some(parent) => self.slot_mut(parent).children.push(id),
            None => self.roots.push(id),
        }
        self.slot_mut(id).parent = parent;
        self.generation += 1;
        Ok(())
    }

    /// Returns `true` if `id` is a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Looks up a node.
    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Looks up a node mutably.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// The processor of `id`, if it is a processing node.
    pub fn processor_mut(&mut self, id: NodeId) -> Option<&mut dyn AudioNode> {
        match &mut self.get_mut(id)?.kind {
            NodeKind::Processor(node) => Some(node.as_mut()),
            _ => None,
        }
    }

    /// Parent of `id`.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Children of `id`. Empty for unknown ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map_or(&[], |n| &n.children)
    }

    /// Root nodes in insertion order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        core::iter::successors(self.parent(id), move |&n| self.parent(n))
    }

    /// First node with the given name, in id order.
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.iter().find(|n| n.name == name).map(|n| n.id)
    }

    /// Live nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &TreeNode> + '_ {
        self.nodes.iter().flatten()
    }

    /// Every node, parents before children. Roots are visited in insertion
    /// order, each subtree breadth-first.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.len);
        for &root in &self.roots {
            self.collect_subtree(root, &mut out);
        }
        out
    }

    fn collect_subtree(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let start = out.len();
        out.push(id);
        let mut cursor = start;
        // breadth-first: a parent always lands before its children
        while cursor < out.len() {
            let current = out[cursor];
            out.extend_from_slice(self.children(current));
            cursor += 1;
        }
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut TreeNode {
        match self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut) {
            Some(node) => node,
            None => unreachable!("{id} checked by caller"),
        }
    }
}

//! Turns a connection table and a node tree into a [`DspPath`].

#[cfg(not(feature = "std"))]
use alloc::{
    collections::{BTreeMap, BTreeSet},
    vec,
    vec::Vec,
};
#[cfg(feature = "std")]
use std::collections::{BTreeMap, BTreeSet};

use super::DspPath;
use super::entry::{
    BufferRef, EntryHandle, EntryRole, InputMix, InputSource, ObjectBuffer, TransformHandle,
    TransformSlot,
};
use crate::buffer::AudioBuffer;
use crate::config::Configuration;
use crate::graph::{
    Connection, ConnectionTable, DirectedGraph, GraphError, NodeId, NodeKind, NodeTree, TreeNode,
};
use crate::node::{ChannelCount, MAX_NODE_CHANNELS};
use crate::transform::TransformBuffer;

/// Why a connection was left out of a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// One end of the connection is not in the node tree.
    MissingNode(NodeId),
    /// The upstream node has fewer output channels than the connection uses.
    OutputOutOfRange {
        /// Output channels the upstream node provides.
        available: usize,
    },
    /// The downstream node has fewer input channels than the connection uses.
    InputOutOfRange {
        /// Input channels the downstream node accepts.
        available: usize,
    },
}

impl core::fmt::Display for DropReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MissingNode(id) => write!(f, "{id} does not exist"),
            Self::OutputOutOfRange { available } => {
                write!(f, "upstream node has {available} output channel(s)")
            }
            Self::InputOutOfRange { available } => {
                write!(f, "downstream node has {available} input channel(s)")
            }
        }
    }
}

/// A connection the builder skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DroppedConnection {
    /// The skipped connection.
    pub connection: Connection,
    /// Why it was skipped.
    pub reason: DropReason,
}

/// Outcome of a successful build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Execution order of the plan.
    pub order: Vec<NodeId>,
    /// Connections left out, in table order.
    pub dropped: Vec<DroppedConnection>,
}

impl BuildReport {
    /// Returns `true` if every connection made it into the plan.
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty()
    }

    fn drop_connection(&mut self, connection: Connection, reason: DropReason) {
        #[cfg(feature = "tracing")]
        tracing::warn!(%connection, %reason, "dropping connection from dsp path");
        self.dropped.push(DroppedConnection { connection, reason });
    }
}

#[derive(Clone, Copy)]
struct Shape {
    role: EntryRole,
    inputs: usize,
    outputs: usize,
}

/// Builds execution plans for one [`Configuration`].
#[derive(Debug, Clone, Copy)]
pub struct PathBuilder {
    config: Configuration,
    output_history: usize,
}

impl PathBuilder {
    /// Creates a builder. Output buffers hold a single block by default.
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            output_history: 1,
        }
    }

    /// Number of blocks each node output keeps (at least 1), for nodes that
    /// read further back than the current block.
    pub fn with_output_history(mut self, blocks: usize) -> Self {
        self.output_history = blocks.max(1);
        self
    }

    /// The configuration plans are sized for.
    pub fn config(&self) -> Configuration {
        self.config
    }

    /// Builds a plan.
    ///
    /// Processors are [`prepare`](crate::AudioNode::prepare)d along the way.
    /// Connections with a missing end or a channel range the node does not
    /// offer are dropped and listed in the [`BuildReport`].
    ///
    /// # Errors
    ///
    /// - [`GraphError::InvalidConfiguration`] for a zero sample rate or block size
    /// - [`GraphError::Cycle`] if the connections cannot be linearized
    pub fn build(
        &self,
        tree: &mut NodeTree,
        connections: &ConnectionTable,
    ) -> Result<(DspPath, BuildReport), GraphError> {
        self.config.validate()?;
        let block = self.config.block_size();
        let mut report = BuildReport::default();

        let mut live = Vec::with_capacity(connections.len());
        for c in connections {
            match [c.from, c.to].into_iter().find(|&id| !tree.contains(id)) {
                Some(missing) => report.drop_connection(*c, DropReason::MissingNode(missing)),
                None => live.push(*c),
            }
        }

        let mut graph = DirectedGraph::new();
        for c in &live {
            graph.add_edge(c.from, c.to);
        }
        for node in tree.iter() {
            if node.processor().is_some_and(|p| p.always_process()) {
                graph.add_node(node.id());
            }
        }
        let order = graph
            .make_linear()
            .map_err(|cycle| GraphError::Cycle(cycle.unresolved))?;

        let mut shapes = BTreeMap::new();
        for &id in &order {
            if let Some(node) = tree.get(id) {
                shapes.insert(id, self.shape(node, &live));
            }
        }

        let mut valid = Vec::with_capacity(live.len());
        for c in live {
            let (Some(from), Some(to)) = (shapes.get(&c.from), shapes.get(&c.to)) else {
                continue;
            };
            if c.output_end().is_none_or(|end| end > from.outputs) {
                let available = from.outputs;
                report.drop_connection(c, DropReason::OutputOutOfRange { available });
            } else if c.input_end().is_none_or(|end| end > to.inputs) {
                let available = to.inputs;
                report.drop_connection(c, DropReason::InputOutOfRange { available });
            } else {
                valid.push(c);
            }
        }

        let mut handles: BTreeMap<NodeId, EntryHandle> = BTreeMap::new();
        let mut entries = Vec::with_capacity(order.len());
        for &id in &order {
            let Some(&shape) = shapes.get(&id) else {
                continue;
            };

            let mut outputs = match shape.role {
                EntryRole::SystemInput => Vec::new(),
                _ => vec![None; shape.outputs],
            };
            for c in valid.iter().filter(|c| c.from == id) {
                for (out, _) in c.links() {
                    if let Some(slot) = outputs.get_mut(out)
                        && slot.is_none()
                    {
                        *slot = Some(AudioBuffer::new(block, self.output_history));
                    }
                }
            }

            let mut inputs = vec![InputSource::Unconnected; shape.inputs];
            let mut mixes = Vec::new();
            for (ch, slot) in inputs.iter_mut().enumerate() {
                let sources: Vec<BufferRef> = valid
                    .iter()
                    .filter(|c| c.to == id)
                    .flat_map(|c| {
                        c.links()
                            .filter(move |&(_, input)| input == ch)
                            .map(move |(output, _)| (c.from, output))
                    })
                    .filter_map(|(from, output)| buffer_ref(from, output, &shapes, &handles))
                    .collect();
                *slot = match sources.len() {
                    0 => InputSource::Unconnected,
                    1 => InputSource::Direct(sources[0]),
                    _ => {
                        mixes.push(InputMix {
                            sources,
                            buffer: AudioBuffer::new(block, 1),
                        });
                        InputSource::Mix(mixes.len() - 1)
                    }
                };
            }

            if let Some(node) = tree.processor_mut(id) {
                node.prepare(&self.config);
            }
            handles.insert(id, EntryHandle(entries.len() as u32));
            entries.push(ObjectBuffer {
                node: id,
                role: shape.role,
                inputs,
                mixes,
                outputs,
                transform: TransformHandle::ROOT,
            });
        }

        let transforms = plan_transforms(tree, &mut entries, block);

        let hardware_inputs = (0..self.config.input_channels())
            .map(|_| AudioBuffer::new(block, 1))
            .collect();
        let hardware_outputs = (0..self.config.output_channels())
            .map(|_| AudioBuffer::new(block, 1))
            .collect();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            entries = entries.len(),
            transforms = transforms.len() - 1,
            dropped = report.dropped.len(),
            config = %self.config,
            "dsp path built"
        );

        report.order = order;
        let path = DspPath {
            config: self.config,
            entries,
            transforms,
            hardware_inputs,
            hardware_outputs,
        };
        Ok((path, report))
    }

    fn shape(&self, node: &TreeNode, live: &[Connection]) -> Shape {
        let (role, inputs, outputs) = match node.kind() {
            NodeKind::Processor(p) => (EntryRole::Processor, p.desired_inputs(), p.desired_outputs()),
            NodeKind::SystemInput => (
                EntryRole::SystemInput,
                ChannelCount::Fixed(0),
                ChannelCount::Fixed(self.config.input_channels()),
            ),
            NodeKind::SystemOutput => (
                EntryRole::SystemOutput,
                ChannelCount::Fixed(self.config.output_channels()),
                ChannelCount::Fixed(0),
            ),
        };
        let id = node.id();
        let inferred_inputs = live
            .iter()
            .filter(|c| c.to == id)
            .filter_map(Connection::input_end)
            .filter(|&end| end <= MAX_NODE_CHANNELS)
            .max()
            .unwrap_or(0);
        let inferred_outputs = live
            .iter()
            .filter(|c| c.from == id)
            .filter_map(Connection::output_end)
            .filter(|&end| end <= MAX_NODE_CHANNELS)
            .max()
            .unwrap_or(0);
        Shape {
            role,
            inputs: inputs.resolve(inferred_inputs),
            outputs: outputs.resolve(inferred_outputs),
        }
    }
}

fn buffer_ref(
    from: NodeId,
    channel: usize,
    shapes: &BTreeMap<NodeId, Shape>,
    handles: &BTreeMap<NodeId, EntryHandle>,
) -> Option<BufferRef> {
    if shapes.get(&from)?.role == EntryRole::SystemInput {
        return Some(BufferRef::Hardware(channel));
    }
    let entry = *handles.get(&from)?;
    Some(BufferRef::Output { entry, channel })
}

/// Creates one transform slot per transform-owning node that some entry reads
/// (itself or as an ancestor), parents first, and points every entry at its
/// own slot or its nearest ancestor's.
fn plan_transforms(
    tree: &NodeTree,
    entries: &mut [ObjectBuffer],
    block: usize,
) -> Vec<TransformSlot> {
    let mut needed = BTreeSet::new();
    for entry in entries.iter() {
        for id in core::iter::once(entry.node).chain(tree.ancestors(entry.node)) {
            if tree.get(id).is_some_and(TreeNode::has_transform) {
                needed.insert(id);
            }
        }
    }

    let mut slots = vec![TransformSlot {
        node: None,
        parent: TransformHandle::ROOT,
        buffer: TransformBuffer::new(block),
    }];
    let mut slot_of: BTreeMap<NodeId, TransformHandle> = BTreeMap::new();
    let nearest = |slot_of: &BTreeMap<NodeId, TransformHandle>, id: NodeId| {
        tree.ancestors(id)
            .find_map(|a| slot_of.get(&a).copied())
            .unwrap_or(TransformHandle::ROOT)
    };

    for id in tree.walk() {
        if !needed.contains(&id) {
            continue;
        }
        let parent = nearest(&slot_of, id);
        slot_of.insert(id, TransformHandle(slots.len() as u32));
        slots.push(TransformSlot {
            node: Some(id),
            parent,
            buffer: TransformBuffer::new(block),
        });
    }

    for entry in entries.iter_mut() {
        entry.transform = slot_of
            .get(&entry.node)
            .copied()
            .unwrap_or_else(|| nearest(&slot_of, entry.node));
    }
    slots
}

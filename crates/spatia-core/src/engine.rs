//! Single-block audio engine.
//!
//! [`AudioEngine`] owns the node tree, the connection table and the current
//! [`DspPath`]. Any edit or configuration change marks the path stale; the next
//! [`process`](AudioEngine::process) call rebuilds it. Rebuilding is the only
//! place the engine allocates. If a rebuild fails the previous path keeps
//! running until the next edit.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::config::Configuration;
use crate::graph::{ConnectionTable, GraphError, NodeKind, NodeTree};
use crate::path::{BuildReport, DspPath, PathBuilder};

/// Channel order of hardware buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SampleLayout {
    /// Frame by frame: `L R L R ...`.
    #[default]
    Interleaved,
    /// Channel by channel: `L L ... R R ...`.
    Planar,
}

/// Errors from [`AudioEngine::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The hardware input buffer does not hold exactly one block.
    InputSize {
        /// Samples one block needs.
        expected: usize,
        /// Samples supplied.
        actual: usize,
    },
    /// The hardware output buffer does not hold exactly one block.
    OutputSize {
        /// Samples one block needs.
        expected: usize,
        /// Samples supplied.
        actual: usize,
    },
    /// Building the first plan failed; the block was rendered as silence.
    Build(GraphError),
    /// No plan exists (an earlier build failed); the block was rendered as
    /// silence.
    NoPath,
}

impl core::fmt::Display for EngineError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InputSize { expected, actual } => {
                write!(f, "input block has {actual} samples, expected {expected}")
            }
            Self::OutputSize { expected, actual } => {
                write!(f, "output block has {actual} samples, expected {expected}")
            }
            Self::Build(e) => write!(f, "dsp path build failed: {e}"),
            Self::NoPath => write!(f, "no dsp path available"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EngineError {}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        Self::Build(e)
    }
}

/// Runs a [`DspPath`] block by block and keeps it in sync with edits.
#[derive(Debug)]
pub struct AudioEngine {
    config: Configuration,
    layout: SampleLayout,
    output_history: usize,
    tree: NodeTree,
    connections: ConnectionTable,
    path: Option<DspPath>,
    stale: bool,
    position: u64,
    last_report: Option<BuildReport>,
}

impl AudioEngine {
    /// Creates an engine with an empty tree and connection table.
    pub fn new(config: Configuration) -> Self {
        Self::with_scene(config, NodeTree::new(), ConnectionTable::new())
    }

    /// Creates an engine around an existing tree and connection table.
    pub fn with_scene(config: Configuration, tree: NodeTree, connections: ConnectionTable) -> Self {
        Self {
            config,
            layout: SampleLayout::Interleaved,
            output_history: 1,
            tree,
            connections,
            path: None,
            stale: true,
            position: 0,
            last_report: None,
        }
    }

    /// Sets the hardware buffer layout.
    pub fn with_layout(mut self, layout: SampleLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Sets how many blocks node outputs keep (see
    /// [`PathBuilder::with_output_history`]).
    pub fn with_output_history(mut self, blocks: usize) -> Self {
        self.output_history = blocks.max(1);
        self.stale = true;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> Configuration {
        self.config
    }

    /// Hardware buffer layout.
    pub fn layout(&self) -> SampleLayout {
        self.layout
    }

    /// Changes the hardware buffer layout. Takes effect on the next block.
    pub fn set_layout(&mut self, layout: SampleLayout) {
        self.layout = layout;
    }

    /// Swaps the configuration. A different value forces a rebuild.
    pub fn set_config(&mut self, config: Configuration) {
        if config != self.config {
            self.config = config;
            self.stale = true;
        }
    }

    /// The node tree.
    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    /// Mutable node tree. Marks the path stale.
    pub fn tree_mut(&mut self) -> &mut NodeTree {
        self.stale = true;
        &mut self.tree
    }

    /// The connection table.
    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    /// Mutable connection table. Marks the path stale.
    pub fn connections_mut(&mut self) -> &mut ConnectionTable {
        self.stale = true;
        &mut self.connections
    }

    /// Replaces the connection table wholesale. Marks the path stale.
    pub fn set_connections(&mut self, connections: ConnectionTable) {
        self.connections = connections;
        self.stale = true;
    }

    /// Adds a node and returns its id. Convenience over [`tree_mut`](Self::tree_mut).
    pub fn add_node(
        &mut self,
        parent: Option<crate::NodeId>,
        name: &str,
        kind: NodeKind,
    ) -> Result<crate::NodeId, GraphError> {
        self.tree_mut().add(parent, name, kind)
    }

    /// Removes a node, its subtree and every connection touching them.
    pub fn remove_node(&mut self, id: crate::NodeId) -> Result<Vec<crate::NodeId>, GraphError> {
        let removed = self.tree_mut().remove(id)?;
        for &gone in &removed {
            self.connections.remove_node(gone);
        }
        Ok(removed)
    }

    /// Returns `true` if the next block will rebuild the path.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// The path currently used for processing.
    pub fn path(&self) -> Option<&DspPath> {
        self.path.as_ref()
    }

    /// Report of the last successful build.
    pub fn last_report(&self) -> Option<&BuildReport> {
        self.last_report.as_ref()
    }

    /// Sample position of the next block.
    pub fn sample_position(&self) -> u64 {
        self.position
    }

    /// Moves the sample clock (seek).
    pub fn set_sample_position(&mut self, position: u64) {
        self.position = position;
    }

    /// Resets every processor, rewinds the clock and forces a rebuild so all
    /// buffers start silent.
    pub fn reset(&mut self) {
        let ids: Vec<_> = self.tree.iter().map(|n| n.id()).collect();
        for id in ids {
            if let Some(node) = self.tree.processor_mut(id) {
                node.reset();
            }
        }
        self.position = 0;
        self.stale = true;
    }

    /// Builds a new path now.
    ///
    /// On failure the previous path stays installed and the engine stops
    /// retrying until the next edit.
    pub fn rebuild(&mut self) -> Result<&BuildReport, GraphError> {
        self.stale = false;
        let builder = PathBuilder::new(self.config).with_output_history(self.output_history);
        match builder.build(&mut self.tree, &self.connections) {
            Ok((path, report)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    entries = path.len(),
                    dropped = report.dropped.len(),
                    "dsp path installed"
                );
                self.path = Some(path);
                Ok(self.last_report.insert(report))
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    error = %e,
                    keeping_previous = self.path.is_some(),
                    "dsp path build failed"
                );
                Err(e)
            }
        }
    }

    /// Processes one hardware block.
    ///
    /// Rebuilds the path first if it is stale. The sample position advances by
    /// one block whether or not a path exists, so time stays continuous across
    /// failed builds.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InputSize`] / [`EngineError::OutputSize`] if the
    ///   buffers do not match the path's configuration
    /// - [`EngineError::Build`] / [`EngineError::NoPath`] if no path could be
    ///   built; `output` is silenced
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> Result<(), EngineError> {
        let mut build_error = None;
        if self.stale
            && let Err(e) = self.rebuild()
        {
            build_error = Some(e);
        }

        let Some(path) = self.path.as_mut() else {
            output.fill(0.0);
            self.position += self.config.block_size() as u64;
            return Err(build_error.map_or(EngineError::NoPath, EngineError::Build));
        };

        let block = path.config().block_size() as u64;
        path.process(&mut self.tree, input, output, self.layout, self.position)?;
        self.position += block;
        Ok(())
    }
}

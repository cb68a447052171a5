//! The processing-node contract.
//!
//! Every processor stored in a [`NodeTree`](crate::NodeTree) implements
//! [`AudioNode`]. The DSP path calls [`process`](AudioNode::process) once per
//! block with per-channel views of its wired inputs and owned outputs;
//! unconnected channels show up as `None` and must be tolerated.

use crate::buffer::AudioBuffer;
use crate::config::Configuration;
use crate::path::{InputMix, InputSource, ObjectBuffer, resolve_source};
use crate::transform::{Matrix4, TransformBuffer};

/// Declared channel count of one side of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelCount {
    /// Exactly this many channels. Connections outside the range are dropped
    /// when the path is built.
    Fixed(usize),
    /// "Don't care": as many channels as the connections use.
    Any,
}

impl ChannelCount {
    /// Resolves against the channel count inferred from connections.
    #[inline]
    pub fn resolve(self, inferred: usize) -> usize {
        match self {
            Self::Fixed(n) => n,
            Self::Any => inferred,
        }
    }
}

/// Largest channel count a [`ChannelCount::Any`] side is inferred to.
/// Connections reaching past it are dropped when the path is built.
pub const MAX_NODE_CHANNELS: usize = 64;

/// Timing and spatial context for one `process` call.
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext<'a> {
    /// Frames in this block.
    pub block_size: usize,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Sample position of the first frame of the block.
    pub position: u64,
    /// Per-sample matrices of the node (its own or inherited).
    pub transform: &'a TransformBuffer,
}

impl<'a> ProcessContext<'a> {
    /// Builds a context for `config` at `position`.
    pub fn new(config: &Configuration, position: u64, transform: &'a TransformBuffer) -> Self {
        Self {
            block_size: config.block_size(),
            sample_rate: config.sample_rate(),
            position,
            transform,
        }
    }

    /// Time of the first frame, in seconds.
    pub fn time(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.position as f64 / f64::from(self.sample_rate)
    }

    /// Matrix for frame `i` of the block.
    #[inline]
    pub fn matrix(&self, i: usize) -> &'a Matrix4 {
        self.transform.get(i)
    }
}

/// Read-only view of a node's input channels.
pub struct NodeInputs<'a> {
    repr: InputsRepr<'a>,
}

enum InputsRepr<'a> {
    Plan {
        sources: &'a [InputSource],
        mixes: &'a [InputMix],
        upstream: &'a [ObjectBuffer],
        hardware: &'a [AudioBuffer],
    },
    Slices(&'a [Option<&'a [f32]>]),
}

impl<'a> NodeInputs<'a> {
    /// Wraps plain slices, for driving a node outside a DSP path.
    pub fn from_slices(channels: &'a [Option<&'a [f32]>]) -> Self {
        Self {
            repr: InputsRepr::Slices(channels),
        }
    }

    pub(crate) fn from_plan(
        sources: &'a [InputSource],
        mixes: &'a [InputMix],
        upstream: &'a [ObjectBuffer],
        hardware: &'a [AudioBuffer],
    ) -> Self {
        Self {
            repr: InputsRepr::Plan {
                sources,
                mixes,
                upstream,
                hardware,
            },
        }
    }

    /// Number of input channels the node was given.
    pub fn len(&self) -> usize {
        match &self.repr {
            InputsRepr::Plan { sources, .. } => sources.len(),
            InputsRepr::Slices(channels) => channels.len(),
        }
    }

    /// Returns `true` if the node has no input channels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples of input channel `ch`, or `None` if it is unconnected.
    pub fn channel(&self, ch: usize) -> Option<&'a [f32]> {
        match self.repr {
            InputsRepr::Plan {
                sources,
                mixes,
                upstream,
                hardware,
            } => resolve_source(sources.get(ch)?, mixes, upstream, hardware),
            InputsRepr::Slices(channels) => channels.get(ch).copied().flatten(),
        }
    }

    /// Returns `true` if input channel `ch` is fed by anything.
    pub fn is_connected(&self, ch: usize) -> bool {
        self.channel(ch).is_some()
    }
}

/// Writable view of a node's output channels.
pub struct NodeOutputs<'a> {
    repr: OutputsRepr<'a>,
}

enum OutputsRepr<'a> {
    Plan(&'a mut [Option<AudioBuffer>]),
    Slices(&'a mut [Option<&'a mut [f32]>]),
}

impl<'a> NodeOutputs<'a> {
    /// Wraps plain slices, for driving a node outside a DSP path.
    pub fn from_slices(channels: &'a mut [Option<&'a mut [f32]>]) -> Self {
        Self {
            repr: OutputsRepr::Slices(channels),
        }
    }

    pub(crate) fn from_plan(buffers: &'a mut [Option<AudioBuffer>]) -> Self {
        Self {
            repr: OutputsRepr::Plan(buffers),
        }
    }

    /// Number of output channels the node was given.
    pub fn len(&self) -> usize {
        match &self.repr {
            OutputsRepr::Plan(buffers) => buffers.len(),
            OutputsRepr::Slices(channels) => channels.len(),
        }
    }

    /// Returns `true` if the node has no output channels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block to write for output channel `ch`, or `None` if nothing reads it.
    pub fn channel_mut(&mut self, ch: usize) -> Option<&mut [f32]> {
        match &mut self.repr {
            OutputsRepr::Plan(buffers) => buffers.get_mut(ch)?.as_mut().map(AudioBuffer::write),
            OutputsRepr::Slices(channels) => channels.get_mut(ch)?.as_deref_mut(),
        }
    }

    /// Returns `true` if output channel `ch` is read by anything.
    pub fn is_connected(&self, ch: usize) -> bool {
        match &self.repr {
            OutputsRepr::Plan(buffers) => buffers.get(ch).is_some_and(Option::is_some),
            OutputsRepr::Slices(channels) => channels.get(ch).is_some_and(Option::is_some),
        }
    }
}

/// A unit of DSP living in the node tree.
///
/// Implementations must be real-time safe in [`process`](Self::process) and
/// [`calculate_transform`](Self::calculate_transform): no allocation, no
/// locking, no blocking I/O. [`prepare`](Self::prepare) runs while a plan is
/// built and may allocate.
pub trait AudioNode: Send {
    /// Declared number of input channels.
    fn desired_inputs(&self) -> ChannelCount;

    /// Declared number of output channels.
    fn desired_outputs(&self) -> ChannelCount;

    /// Whether the node computes its own spatial transform.
    ///
    /// Nodes returning `false` inherit the matrix of their nearest ancestor
    /// that returns `true`, or the identity.
    fn has_transform(&self) -> bool {
        false
    }

    /// Whether the node runs even without any audio connection (meters,
    /// analysers, control sources).
    fn always_process(&self) -> bool {
        false
    }

    /// Called once per plan build with the configuration it is built for.
    fn prepare(&mut self, config: &Configuration) {
        let _ = config;
    }

    /// Processes one block.
    fn process(
        &mut self,
        inputs: &NodeInputs<'_>,
        outputs: &mut NodeOutputs<'_>,
        ctx: &ProcessContext<'_>,
    );

    /// Applies this node's transform to `matrix` for the given time in
    /// seconds. `matrix` arrives holding the parent's matrix for that sample.
    fn calculate_transform(&mut self, matrix: &mut Matrix4, time: f64) {
        let _ = (matrix, time);
    }

    /// Clears internal state (phases, filters, envelopes).
    fn reset(&mut self) {}
}

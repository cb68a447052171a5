//! Plan entries and the handles that link them.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::buffer::AudioBuffer;
use crate::graph::NodeId;
use crate::transform::TransformBuffer;

/// Index of an [`ObjectBuffer`] inside a [`DspPath`](super::DspPath).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryHandle(pub(crate) u32);

impl EntryHandle {
    /// Position of the entry in execution order.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a transform slot inside a [`DspPath`](super::DspPath).
///
/// Slot 0 is the scene root and always holds identity matrices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransformHandle(pub(crate) u32);

impl TransformHandle {
    /// The identity slot shared by nodes without any transforming ancestor.
    pub const ROOT: Self = Self(0);

    /// Slot position.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What an entry does when its turn comes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryRole {
    /// Run mixes, call the node's `process`, advance its outputs.
    Processor,
    /// Nothing to run; consumers read the hardware input buffers directly.
    SystemInput,
    /// Run mixes, then sum every input channel into the hardware outputs.
    SystemOutput,
}

/// Location of a completed block another entry can read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferRef {
    /// Output channel of an earlier entry.
    Output {
        /// Upstream entry.
        entry: EntryHandle,
        /// Output channel of that entry.
        channel: usize,
    },
    /// Hardware input channel.
    Hardware(usize),
}

/// How one input channel of an entry is fed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputSource {
    /// Nothing is connected; the node sees `None`.
    Unconnected,
    /// Exactly one upstream buffer, read in place.
    Direct(BufferRef),
    /// Several upstream buffers, summed into the entry's mix slot first.
    Mix(usize),
}

/// Fan-in step: several upstream buffers summed before the node runs.
#[derive(Debug, Clone)]
pub struct InputMix {
    pub(crate) sources: Vec<BufferRef>,
    pub(crate) buffer: AudioBuffer,
}

impl InputMix {
    /// Buffers summed by this step, in connection order.
    pub fn sources(&self) -> &[BufferRef] {
        &self.sources
    }

    /// The summed block of the current cycle.
    pub fn read(&self) -> &[f32] {
        self.buffer.read()
    }
}

/// Runtime bundle for one node: owned outputs, input links, mix steps and the
/// transform slot it reads.
#[derive(Debug, Clone)]
pub struct ObjectBuffer {
    pub(crate) node: NodeId,
    pub(crate) role: EntryRole,
    pub(crate) inputs: Vec<InputSource>,
    pub(crate) mixes: Vec<InputMix>,
    pub(crate) outputs: Vec<Option<AudioBuffer>>,
    pub(crate) transform: TransformHandle,
}

impl ObjectBuffer {
    /// Node this entry runs.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Entry role.
    pub fn role(&self) -> EntryRole {
        self.role
    }

    /// One source per input channel.
    pub fn inputs(&self) -> &[InputSource] {
        &self.inputs
    }

    /// Fan-in steps, referenced by [`InputSource::Mix`].
    pub fn mixes(&self) -> &[InputMix] {
        &self.mixes
    }

    /// Output buffers, `None` where nothing reads the channel.
    pub fn outputs(&self) -> &[Option<AudioBuffer>] {
        &self.outputs
    }

    /// Output buffer of channel `ch`, if allocated.
    pub fn output(&self, ch: usize) -> Option<&AudioBuffer> {
        self.outputs.get(ch).and_then(Option::as_ref)
    }

    /// Transform slot this entry reads.
    pub fn transform(&self) -> TransformHandle {
        self.transform
    }

    /// Sums every mix step's sources into its buffer and completes the block.
    pub(crate) fn run_mixes(&mut self, upstream: &[ObjectBuffer], hardware: &[AudioBuffer]) {
        for mix in &mut self.mixes {
            mix.buffer.write_null();
            for &source in &mix.sources {
                if let Some(samples) = resolve_ref(source, upstream, hardware) {
                    mix.buffer.write_add(samples);
                }
            }
            mix.buffer.next_block();
        }
    }
}

/// Transform slot: a per-sample matrix buffer seeded from its parent slot.
#[derive(Debug, Clone)]
pub(crate) struct TransformSlot {
    /// Owning node; `None` for the root slot.
    pub node: Option<NodeId>,
    pub parent: TransformHandle,
    pub buffer: TransformBuffer,
}

/// Resolves a buffer reference against completed upstream entries.
pub(crate) fn resolve_ref<'a>(
    source: BufferRef,
    upstream: &'a [ObjectBuffer],
    hardware: &'a [AudioBuffer],
) -> Option<&'a [f32]> {
    match source {
        BufferRef::Output { entry, channel } => upstream
            .get(entry.index())?
            .outputs
            .get(channel)?
            .as_ref()
            .map(AudioBuffer::read),
        BufferRef::Hardware(channel) => hardware.get(channel).map(AudioBuffer::read),
    }
}

/// Resolves an input source of the entry owning `mixes`.
pub(crate) fn resolve_source<'a>(
    source: &InputSource,
    mixes: &'a [InputMix],
    upstream: &'a [ObjectBuffer],
    hardware: &'a [AudioBuffer],
) -> Option<&'a [f32]> {
    match *source {
        InputSource::Unconnected => None,
        InputSource::Direct(r) => resolve_ref(r, upstream, hardware),
        InputSource::Mix(i) => mixes.get(i).map(InputMix::read),
    }
}

//! DSP path: the buffer-wired execution plan for one configuration.
//!
//! A [`DspPath`] is rebuilt wholesale by [`PathBuilder`] whenever topology or
//! configuration changes and is never patched in place. It is a flat arena:
//!
//! - [`ObjectBuffer`] entries in dependency order, one per node. Each owns its
//!   output [`AudioBuffer`]s (`None` where nothing reads a channel) and stores
//!   its inputs as [`BufferRef`] handles into earlier entries or the hardware
//!   input buffers.
//! - Fan-in is explicit. An input channel fed by several connections gets an
//!   [`InputMix`] step that sums its sources before the node runs.
//! - Transform slots, parents first. Slot 0 is the identity root; every entry
//!   points at its own slot or its nearest transforming ancestor's.
//! - Hardware input and output buffers, one per channel.
//!
//! # Block execution
//!
//! [`DspPath::process`] never allocates:
//!
//! 1. hardware input is deinterleaved (or copied) into the input buffers
//! 2. transform slots are computed per sample, each seeded with its parent
//! 3. entries run in order: mixes, `process`, outputs advance
//! 4. system-output entries sum their inputs into the hardware outputs
//! 5. hardware outputs are written to the caller's buffer

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

use core::fmt::Write as _;

mod builder;
mod entry;

pub use builder::{BuildReport, DropReason, DroppedConnection, PathBuilder};
pub(crate) use entry::resolve_source;
pub use entry::{
    BufferRef, EntryHandle, EntryRole, InputMix, InputSource, ObjectBuffer, TransformHandle,
};

use entry::TransformSlot;

use crate::buffer::AudioBuffer;
use crate::config::Configuration;
use crate::engine::{EngineError, SampleLayout};
use crate::graph::{NodeId, NodeTree};
use crate::node::{NodeInputs, NodeOutputs, ProcessContext};
use crate::transform::TransformBuffer;

/// Execution plan built by [`PathBuilder`].
#[derive(Debug, Clone)]
pub struct DspPath {
    config: Configuration,
    entries: Vec<ObjectBuffer>,
    transforms: Vec<TransformSlot>,
    hardware_inputs: Vec<AudioBuffer>,
    hardware_outputs: Vec<AudioBuffer>,
}

impl DspPath {
    /// Configuration the plan is sized for.
    pub fn config(&self) -> Configuration {
        self.config
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the plan runs no nodes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Node ids in execution order.
    pub fn order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().map(ObjectBuffer::node)
    }

    /// All entries in execution order.
    pub fn entries(&self) -> &[ObjectBuffer] {
        &self.entries
    }

    /// Entry behind a handle.
    pub fn entry(&self, handle: EntryHandle) -> Option<&ObjectBuffer> {
        self.entries.get(handle.index())
    }

    /// Entry running `node`, if it is part of the plan.
    pub fn find(&self, node: NodeId) -> Option<&ObjectBuffer> {
        self.entries.iter().find(|e| e.node == node)
    }

    /// Number of transform slots, not counting the identity root.
    pub fn transform_count(&self) -> usize {
        self.transforms.len() - 1
    }

    /// Matrices of a transform slot for the current block.
    pub fn transform(&self, handle: TransformHandle) -> Option<&TransformBuffer> {
        self.transforms.get(handle.index()).map(|slot| &slot.buffer)
    }

    /// Hardware input buffer of channel `ch`.
    pub fn hardware_input(&self, ch: usize) -> Option<&AudioBuffer> {
        self.hardware_inputs.get(ch)
    }

    /// Hardware output buffer of channel `ch`.
    pub fn hardware_output(&self, ch: usize) -> Option<&AudioBuffer> {
        self.hardware_outputs.get(ch)
    }

    /// Runs one block.
    ///
    /// `input` and `output` hold exactly one block of every hardware channel,
    /// laid out as `layout` says. Nodes removed from `tree` since the build
    /// produce silence.
    pub fn process(
        &mut self,
        tree: &mut NodeTree,
        input: &[f32],
        output: &mut [f32],
        layout: SampleLayout,
        position: u64,
    ) -> Result<(), EngineError> {
        let block = self.config.block_size();
        let n_in = self.hardware_inputs.len();
        let n_out = self.hardware_outputs.len();
        if input.len() != block * n_in {
            return Err(EngineError::InputSize {
                expected: block * n_in,
                actual: input.len(),
            });
        }
        if output.len() != block * n_out {
            return Err(EngineError::OutputSize {
                expected: block * n_out,
                actual: output.len(),
            });
        }

        for (ch, buf) in self.hardware_inputs.iter_mut().enumerate() {
            match layout {
                SampleLayout::Interleaved => buf.write_strided(input, ch, n_in),
                SampleLayout::Planar => buf.write_from(&input[ch * block..(ch + 1) * block]),
            }
            buf.next_block();
        }

        self.calculate_transforms(tree, position);

        for buf in &mut self.hardware_outputs {
            buf.write_null();
        }

        for i in 0..self.entries.len() {
            let (upstream, rest) = self.entries.split_at_mut(i);
            let entry = &mut rest[0];
            entry.run_mixes(upstream, &self.hardware_inputs);

            match entry.role {
                EntryRole::Processor => {
                    let Some(node) = tree.processor_mut(entry.node) else {
                        for out in entry.outputs.iter_mut().flatten() {
                            out.write_null();
                            out.next_block();
                        }
                        continue;
                    };
                    let inputs = NodeInputs::from_plan(
                        &entry.inputs,
                        &entry.mixes,
                        upstream,
                        &self.hardware_inputs,
                    );
                    let mut outputs = NodeOutputs::from_plan(&mut entry.outputs);
                    let ctx = ProcessContext {
                        block_size: block,
                        sample_rate: self.config.sample_rate(),
                        position,
                        transform: &self.transforms[entry.transform.index()].buffer,
                    };
                    node.process(&inputs, &mut outputs, &ctx);
                    for out in entry.outputs.iter_mut().flatten() {
                        out.next_block();
                    }
                }
                EntryRole::SystemInput => {}
                EntryRole::SystemOutput => {
                    for (ch, source) in entry.inputs.iter().enumerate() {
                        let samples =
                            resolve_source(source, &entry.mixes, upstream, &self.hardware_inputs);
                        if let (Some(samples), Some(hw)) =
                            (samples, self.hardware_outputs.get_mut(ch))
                        {
                            hw.write_add(samples);
                        }
                    }
                }
            }
        }

        for (ch, buf) in self.hardware_outputs.iter_mut().enumerate() {
            buf.next_block();
            match layout {
                SampleLayout::Interleaved => buf.read_strided(output, ch, n_out),
                SampleLayout::Planar => {
                    output[ch * block..(ch + 1) * block].copy_from_slice(buf.read());
                }
            }
        }
        Ok(())
    }

    fn calculate_transforms(&mut self, tree: &mut NodeTree, position: u64) {
        let rate = f64::from(self.config.sample_rate());
        for i in 1..self.transforms.len() {
            let (done, rest) = self.transforms.split_at_mut(i);
            let slot = &mut rest[0];
            slot.buffer.copy_from(&done[slot.parent.index()].buffer);
            let Some(node) = slot.node else { continue };
            let Some(node) = tree.processor_mut(node) else {
                continue;
            };
            for (k, matrix) in slot.buffer.as_mut_slice().iter_mut().enumerate() {
                let time = (position + k as u64) as f64 / rate;
                node.calculate_transform(matrix, time);
            }
        }
    }

    /// Human-readable dump of the plan: entries, their wiring, mix steps and
    /// transform sources. Names come from `tree`.
    pub fn describe(&self, tree: &NodeTree) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "dsp path: {}", self.config);
        for (i, entry) in self.entries.iter().enumerate() {
            let name = tree.get(entry.node).map_or("?", |n| n.name());
            let role = match entry.role {
                EntryRole::Processor => "processor",
                EntryRole::SystemInput => "system-input",
                EntryRole::SystemOutput => "system-output",
            };
            let _ = writeln!(out, "  #{i} {} \"{name}\" {role}", entry.node);
            for (ch, source) in entry.inputs.iter().enumerate() {
                let _ = write!(out, "      in {ch} <- ");
                match source {
                    InputSource::Unconnected => out.push('-'),
                    InputSource::Direct(r) => self.write_ref(&mut out, *r),
                    InputSource::Mix(m) => {
                        out.push_str("mix[");
                        for (k, r) in entry.mixes[*m].sources.iter().enumerate() {
                            if k > 0 {
                                out.push_str(", ");
                            }
                            self.write_ref(&mut out, *r);
                        }
                        out.push(']');
                    }
                }
                out.push('\n');
            }
            for (ch, buf) in entry.outputs.iter().enumerate() {
                match buf {
                    Some(buf) => {
                        let _ = writeln!(out, "      out {ch}: {} block(s)", buf.num_blocks());
                    }
                    None => {
                        let _ = writeln!(out, "      out {ch}: -");
                    }
                }
            }
            if entry.transform != TransformHandle::ROOT {
                let owner = self.transforms[entry.transform.index()].node;
                if let Some(owner) = owner {
                    let _ = writeln!(out, "      transform: {owner}");
                }
            }
        }
        out
    }

    fn write_ref(&self, out: &mut String, r: BufferRef) {
        let _ = match r {
            BufferRef::Output { entry, channel } => write!(out, "#{}.{channel}", entry.index()),
            BufferRef::Hardware(channel) => write!(out, "hw-in {channel}"),
        };
    }
}

//! Spatia Core - the audio processing graph of the spatia engine
//!
//! This crate turns an authored network of audio nodes into a loop-free,
//! buffer-wired execution plan and runs that plan one block at a time with zero
//! allocation on the steady-state path.
//!
//! # Core Abstractions
//!
//! ## Topology
//!
//! - [`DirectedGraph`] - Build-time adjacency graph with Kahn linearization
//! - [`ConnectionTable`] - Authored channel-scoped edges with loop prevention
//! - [`NodeTree`] - Node arena with parent links (transform inheritance)
//!
//! ## Nodes
//!
//! - [`AudioNode`] - Object-safe trait every processing node implements
//! - [`NodeInputs`] / [`NodeOutputs`] - Per-channel views handed to `process`
//! - [`nodes`] - Small built-in node set (constant, sine, gain, orbit, distance gain)
//!
//! ## Buffers and Transforms
//!
//! - [`AudioBuffer`] - Ring of fixed-size sample blocks with read/write cursors
//! - [`TransformBuffer`] - One 4x4 matrix per sample of a block
//!
//! ## Execution
//!
//! - [`PathBuilder`] / [`DspPath`] - Execution plan: ordered entries, owned
//!   output buffers, input links stored as arena handles, explicit mix steps
//! - [`AudioEngine`] - Lazily rebuilds the plan and processes hardware blocks
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible (with `alloc`). Disable the default `std`
//! feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! spatia-core = { version = "0.1", default-features = false }
//! ```
//!
//! # Example
//!
//! ```rust
//! use spatia_core::{AudioEngine, Configuration, Connection, NodeKind};
//! use spatia_core::nodes::Constant;
//!
//! let config = Configuration::new(48000, 64, 0, 1);
//! let mut engine = AudioEngine::new(config);
//!
//! let osc = engine
//!     .tree_mut()
//!     .add(None, "osc", NodeKind::Processor(Box::new(Constant::new(0.25))))
//!     .unwrap();
//! let out = engine.tree_mut().add(None, "out", NodeKind::SystemOutput).unwrap();
//! engine.connections_mut().connect(Connection::new(osc, 0, out, 0)).unwrap();
//!
//! let mut output = vec![0.0; 64];
//! engine.process(&[], &mut output).unwrap();
//! assert!(output.iter().all(|&s| s == 0.25));
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: plan building is the only place that allocates
//! - **Build-time graph, flat runtime plan**: the adjacency graph is discarded
//!   once the execution order is known
//! - **Handles, not pointers**: plan entries reference each other by index

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod buffer;
pub mod config;
pub mod engine;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod path;
pub mod transform;

// Re-export main types at crate root
pub use buffer::AudioBuffer;
pub use config::Configuration;
pub use engine::{AudioEngine, EngineError, SampleLayout};
pub use graph::{
    Connection, ConnectionTable, Cycle, DirectedGraph, GraphError, GraphNode, NodeId, NodeKind,
    NodeTree, TreeNode,
};
pub use node::{
    AudioNode, ChannelCount, MAX_NODE_CHANNELS, NodeInputs, NodeOutputs, ProcessContext,
};
pub use path::{
    BufferRef, BuildReport, DropReason, DroppedConnection, DspPath, EntryHandle, EntryRole,
    InputSource, ObjectBuffer, PathBuilder, TransformHandle,
};
pub use transform::{IDENTITY, Matrix4, TransformBuffer};

//! Settings and patch files for the spatia engine.
//!
//! This crate provides the TOML surface of the engine:
//!
//! - **Engine settings**: [`EngineSettings`] holds the device format
//!   (`[audio]`) and real-time scheduling (`[live]`), with validation and
//!   conversion to a core [`Configuration`](spatia_core::Configuration)
//! - **Patches**: [`Patch`] describes an authored scene of `[[node]]` and
//!   `[[connection]]` entries and instantiates it into a node tree and
//!   connection table, running every connection through the loop check
//!
//! # Example
//!
//! ```rust
//! use spatia_config::{EngineSettings, Patch};
//! use spatia_core::AudioEngine;
//!
//! let settings = EngineSettings::from_toml_str("[audio]\nblock_size = 64\n").unwrap();
//! let patch = Patch::from_toml_str(r#"
//!     [[node]]
//!     name = "tone"
//!     kind = "sine"
//!     params = { freq = "440Hz", amp = 0.25 }
//!
//!     [[node]]
//!     name = "out"
//!     kind = "output"
//!
//!     [[connection]]
//!     from = "tone"
//!     to = "out"
//! "#).unwrap();
//!
//! let mut engine = AudioEngine::new(settings.configuration());
//! let mut connections = engine.connections().clone();
//! patch.instantiate(engine.tree_mut(), &mut connections).unwrap();
//! engine.set_connections(connections);
//! ```

mod error;
pub mod patch;
pub mod settings;

pub use error::ConfigError;
pub use patch::{ConnectionSpec, NODE_KINDS, NodeSpec, ParamValue, Patch, parse_quantity};
pub use settings::{AudioSettings, EngineSettings, Layout, LiveSection};

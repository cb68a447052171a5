//! Audio I/O layer for the spatia engine.
//!
//! This crate provides:
//!
//! - **Device backends**: the [`AudioBackend`] trait, the cpal-based
//!   [`CpalBackend`] and the deterministic [`ManualBackend`] for tests
//! - **Lock-free queues**: [`spsc`] single-producer/single-consumer queues and
//!   recycling block channels
//! - **Live engine**: [`LiveEngine`] runs an [`AudioEngine`](spatia_core::AudioEngine)
//!   ahead of real time on a worker thread and feeds the hardware callback
//! - **Offline rendering**: [`render_blocks`] and [`render_to_wav`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spatia_core::{AudioEngine, Configuration};
//! use spatia_io::{CpalBackend, LiveEngine, LiveSettings};
//!
//! let engine = AudioEngine::new(Configuration::default());
//! let mut live = LiveEngine::new(CpalBackend::new()?, engine, LiveSettings::default());
//! live.start()?;
//! // edit the scene while it plays
//! live.stop()?;
//! ```

pub mod backend;
pub mod cpal_backend;
mod init;
mod live;
pub mod manual;
pub mod render;
pub mod spsc;
mod wav;

pub use backend::{AudioBackend, DeviceInfo, DuplexCallback, StreamHandle};
pub use cpal_backend::{CpalBackend, default_devices, list_devices};
pub use init::{BackendToken, backend_refcount, ensure_backend_initialized};
pub use live::{EngineState, LiveEngine, LiveSettings, LiveStats};
pub use manual::{ManualBackend, ManualDriver};
pub use render::{render_blocks, render_to_wav};
pub use wav::{WavSpec, read_wav, write_wav};

use spatia_core::{EngineError, GraphError};

/// Classification of device failures, independent of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    /// The device is missing, busy or was unplugged.
    DeviceUnavailable,
    /// The device rejected the sample rate, block size or channel count.
    FormatUnsupported,
    /// No device matches the requested name.
    DeviceNotFound,
    /// Any other stream setup or runtime failure.
    Stream,
    /// Not a device error.
    Other,
}

/// Error types for audio I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The device is missing, busy or was unplugged.
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The requested stream format is not supported by the device.
    #[error("Unsupported stream format: {0}")]
    FormatUnsupported(String),

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Audio stream setup or runtime error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// The operation is not allowed in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Topology or configuration error from the core graph.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Block processing error from the audio engine.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// WAV file read/write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds the device error matching `kind`.
    pub fn device(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            DeviceErrorKind::DeviceUnavailable => Self::DeviceUnavailable(message),
            DeviceErrorKind::FormatUnsupported => Self::FormatUnsupported(message),
            DeviceErrorKind::DeviceNotFound => Self::DeviceNotFound(message),
            DeviceErrorKind::Stream | DeviceErrorKind::Other => Self::Stream(message),
        }
    }

    /// Classifies this error.
    pub fn kind(&self) -> DeviceErrorKind {
        match self {
            Self::DeviceUnavailable(_) => DeviceErrorKind::DeviceUnavailable,
            Self::FormatUnsupported(_) => DeviceErrorKind::FormatUnsupported,
            Self::DeviceNotFound(_) => DeviceErrorKind::DeviceNotFound,
            Self::Stream(_) => DeviceErrorKind::Stream,
            _ => DeviceErrorKind::Other,
        }
    }

    /// Returns `true` for failures reported by a device backend.
    pub fn is_device_error(&self) -> bool {
        self.kind() != DeviceErrorKind::Other
    }
}

/// Convenience result type for audio I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

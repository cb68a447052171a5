//! Hardware device abstraction.
//!
//! [`AudioBackend`] decouples the live engine from any specific platform audio
//! API. A backend follows a fixed life cycle:
//!
//! ```text
//! open(config) ──► set_callback(cb) ──► start() ──► stop() ──► close()
//!                        ▲                             │
//!                        └─────────────────────────────┘
//! ```
//!
//! `start` moves the installed callback onto the driver's real-time thread; a
//! new callback must be installed before every `start`. Stream handles are
//! type-erased through [`StreamHandle`] so platform types stay out of
//! application code.
//!
//! Implementations:
//!
//! - [`CpalBackend`](crate::CpalBackend): ALSA, CoreAudio, WASAPI through cpal
//! - [`ManualBackend`](crate::ManualBackend): driven by test code, deterministic

use spatia_core::Configuration;

use crate::Result;

/// Duplex audio callback.
///
/// Called on the driver's real-time thread with one captured input buffer and
/// one output buffer to fill. Both are interleaved (`[L0, R0, L1, R1, ...]`);
/// their frame counts are chosen by the driver and need not match the engine's
/// block size. The input buffer is empty when no input channels are open.
///
/// ## Real-Time Safety
///
/// Implementations must not allocate, lock mutexes, log or perform I/O.
pub type DuplexCallback = Box<dyn FnMut(&[f32], &mut [f32]) + Send>;

/// Audio device information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Human-readable device name.
    pub name: String,
    /// Whether the device supports audio input.
    pub is_input: bool,
    /// Whether the device supports audio output.
    pub is_output: bool,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
}

/// Type-erased audio stream handle.
///
/// Wraps a backend-specific stream object. The stream is active while this
/// handle exists; dropping it stops playback or capture.
pub struct StreamHandle {
    _inner: Box<dyn Send>,
}

impl StreamHandle {
    /// Wraps a backend-specific stream object, keeping it alive until the
    /// handle is dropped.
    pub fn new<T: Send + 'static>(stream: T) -> Self {
        Self {
            _inner: Box::new(stream),
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}

/// Hardware device collaborator.
///
/// Object-safe, so callers can select a backend at runtime with
/// `Box<dyn AudioBackend>`.
pub trait AudioBackend: Send {
    /// Human-readable name of this backend (e.g. "cpal", "manual").
    fn name(&self) -> &str;

    /// Opens the device for `config`: sample rate, block size and channel
    /// counts. Reopening with a different configuration closes first.
    ///
    /// # Errors
    ///
    /// Device errors classify as
    /// [`DeviceUnavailable`](crate::DeviceErrorKind::DeviceUnavailable),
    /// [`FormatUnsupported`](crate::DeviceErrorKind::FormatUnsupported) or
    /// [`DeviceNotFound`](crate::DeviceErrorKind::DeviceNotFound).
    fn open(&mut self, config: &Configuration) -> Result<()>;

    /// Installs the callback the next [`start`](Self::start) hands to the
    /// driver. Replaces any callback not yet started.
    fn set_callback(&mut self, callback: DuplexCallback) -> Result<()>;

    /// Starts streaming. Requires an open device and an installed callback.
    fn start(&mut self) -> Result<()>;

    /// Stops streaming and drops the running callback. The device stays open.
    fn stop(&mut self) -> Result<()>;

    /// Stops if needed and releases the device.
    fn close(&mut self);

    /// Returns `true` between a successful `open` and `close`.
    fn is_open(&self) -> bool;

    /// Returns `true` between a successful `start` and `stop`.
    fn is_running(&self) -> bool;
}

impl<B: AudioBackend + ?Sized> AudioBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn open(&mut self, config: &Configuration) -> Result<()> {
        (**self).open(config)
    }

    fn set_callback(&mut self, callback: DuplexCallback) -> Result<()> {
        (**self).set_callback(callback)
    }

    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_handle_debug() {
        let handle = StreamHandle::new(42u32);
        let debug_str = format!("{:?}", handle);
        assert!(debug_str.contains("StreamHandle"));
    }

    #[test]
    fn test_boxed_backend_is_a_backend() {
        let (backend, _driver) = crate::ManualBackend::new();
        let mut boxed: Box<dyn AudioBackend> = Box::new(backend);
        assert_eq!(boxed.name(), "manual");
        boxed.open(&Configuration::new(48000, 64, 0, 2)).unwrap();
        assert!(boxed.is_open());
        boxed.close();
        assert!(!boxed.is_open());
    }
}

//! Deterministic backend driven by test code.
//!
//! [`ManualBackend`] behaves like a device whose callback fires only when the
//! paired [`ManualDriver`] calls [`tick`](ManualDriver::tick). Tests choose the
//! callback buffer sizes and timing, and can inject open or start failures.
//!
//! ```rust
//! use spatia_core::Configuration;
//! use spatia_io::{AudioBackend, ManualBackend};
//!
//! let (mut backend, driver) = ManualBackend::new();
//! backend.open(&Configuration::new(48000, 4, 0, 1)).unwrap();
//! backend.set_callback(Box::new(|_, out| out.fill(0.5))).unwrap();
//! backend.start().unwrap();
//!
//! let mut out = [0.0; 4];
//! assert!(driver.tick(&[], &mut out));
//! assert_eq!(out, [0.5; 4]);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use spatia_core::Configuration;

use crate::backend::{AudioBackend, DuplexCallback};
use crate::{DeviceErrorKind, Error, Result};

#[derive(Default)]
struct Device {
    config: Option<Configuration>,
    running: Option<DuplexCallback>,
    ticks: u64,
}

/// Backend whose callback is fired by a [`ManualDriver`].
pub struct ManualBackend {
    device: Arc<Mutex<Device>>,
    pending: Option<DuplexCallback>,
    fail_open: Option<DeviceErrorKind>,
    fail_start: Option<DeviceErrorKind>,
}

impl ManualBackend {
    /// Creates a backend and the driver that fires its callback.
    pub fn new() -> (Self, ManualDriver) {
        let device = Arc::new(Mutex::new(Device::default()));
        let driver = ManualDriver {
            device: Arc::clone(&device),
        };
        let backend = Self {
            device,
            pending: None,
            fail_open: None,
            fail_start: None,
        };
        (backend, driver)
    }

    /// Makes every `open` fail with `kind`.
    pub fn fail_open(mut self, kind: DeviceErrorKind) -> Self {
        self.fail_open = Some(kind);
        self
    }

    /// Makes every `start` fail with `kind`.
    pub fn fail_start(mut self, kind: DeviceErrorKind) -> Self {
        self.fail_start = Some(kind);
        self
    }

    /// Clears injected failures.
    pub fn clear_failures(&mut self) {
        self.fail_open = None;
        self.fail_start = None;
    }
}

impl AudioBackend for ManualBackend {
    fn name(&self) -> &str {
        "manual"
    }

    fn open(&mut self, config: &Configuration) -> Result<()> {
        if let Some(kind) = self.fail_open {
            return Err(Error::device(kind, "injected open failure"));
        }
        let mut device = self.device.lock();
        device.running = None;
        device.config = Some(*config);
        Ok(())
    }

    fn set_callback(&mut self, callback: DuplexCallback) -> Result<()> {
        self.pending = Some(callback);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let mut device = self.device.lock();
        if device.config.is_none() {
            return Err(Error::InvalidState("device is not open".into()));
        }
        if device.running.is_some() {
            return Err(Error::InvalidState("device is already running".into()));
        }
        if let Some(kind) = self.fail_start {
            return Err(Error::device(kind, "injected start failure"));
        }
        let Some(callback) = self.pending.take() else {
            return Err(Error::InvalidState("no callback installed".into()));
        };
        device.running = Some(callback);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        // Take the callback out before dropping it so the lock is not held
        // while its captured state is torn down.
        let callback = self.device.lock().running.take();
        drop(callback);
        Ok(())
    }

    fn close(&mut self) {
        let callback = {
            let mut device = self.device.lock();
            device.config = None;
            device.running.take()
        };
        drop(callback);
        self.pending = None;
    }

    fn is_open(&self) -> bool {
        self.device.lock().config.is_some()
    }

    fn is_running(&self) -> bool {
        self.device.lock().running.is_some()
    }
}

/// Fires the callback of a [`ManualBackend`], standing in for the driver's
/// real-time thread.
#[derive(Clone)]
pub struct ManualDriver {
    device: Arc<Mutex<Device>>,
}

impl ManualDriver {
    /// Invokes the running callback once. Returns `false` (and leaves `output`
    /// untouched) if the device is not running.
    pub fn tick(&self, input: &[f32], output: &mut [f32]) -> bool {
        let mut device = self.device.lock();
        let Some(callback) = device.running.as_mut() else {
            return false;
        };
        callback(input, output);
        device.ticks += 1;
        true
    }

    /// Fires one callback sized to exactly one block of the open
    /// configuration, with a silent input, and returns the output.
    pub fn tick_block(&self) -> Option<Vec<f32>> {
        let config = self.config()?;
        let input = vec![0.0; config.input_samples()];
        let mut output = vec![0.0; config.output_samples()];
        self.tick(&input, &mut output).then_some(output)
    }

    /// Configuration the device was opened with.
    pub fn config(&self) -> Option<Configuration> {
        self.device.lock().config
    }

    /// Number of callbacks fired so far.
    pub fn ticks(&self) -> u64 {
        self.device.lock().ticks
    }

    /// Returns `true` while the device is running.
    pub fn is_running(&self) -> bool {
        self.device.lock().running.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Configuration {
        Configuration::new(48000, 4, 1, 1)
    }

    #[test]
    fn test_tick_requires_running_device() {
        let (mut backend, driver) = ManualBackend::new();
        let mut out = [1.0; 4];
        assert!(!driver.tick(&[0.0; 4], &mut out));

        backend.open(&config()).unwrap();
        backend
            .set_callback(Box::new(|input, output| output.copy_from_slice(input)))
            .unwrap();
        backend.start().unwrap();
        assert!(driver.tick(&[0.25; 4], &mut out));
        assert_eq!(out, [0.25; 4]);
        assert_eq!(driver.ticks(), 1);

        backend.stop().unwrap();
        assert!(!driver.is_running());
        assert!(backend.is_open());
    }

    #[test]
    fn test_start_without_callback_or_open_fails() {
        let (mut backend, _driver) = ManualBackend::new();
        assert!(matches!(backend.start(), Err(Error::InvalidState(_))));
        backend.open(&config()).unwrap();
        assert!(matches!(backend.start(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_injected_failures() {
        let (backend, _driver) = ManualBackend::new();
        let mut backend = backend.fail_open(DeviceErrorKind::DeviceUnavailable);
        let err = backend.open(&config()).unwrap_err();
        assert_eq!(err.kind(), DeviceErrorKind::DeviceUnavailable);
        assert!(!backend.is_open());

        backend.clear_failures();
        let mut backend = backend.fail_start(DeviceErrorKind::FormatUnsupported);
        backend.open(&config()).unwrap();
        backend.set_callback(Box::new(|_, _| {})).unwrap();
        let err = backend.start().unwrap_err();
        assert_eq!(err.kind(), DeviceErrorKind::FormatUnsupported);
        assert!(!backend.is_running());
    }

    #[test]
    fn test_tick_block_sizes_from_config() {
        let (mut backend, driver) = ManualBackend::new();
        assert!(driver.tick_block().is_none());
        backend.open(&Configuration::new(48000, 8, 0, 2)).unwrap();
        backend.set_callback(Box::new(|_, out| out.fill(1.0))).unwrap();
        backend.start().unwrap();
        assert_eq!(driver.tick_block(), Some(vec![1.0; 16]));
    }
}

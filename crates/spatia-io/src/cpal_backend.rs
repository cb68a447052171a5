//! cpal-based audio backend.
//!
//! [`CpalBackend`] wraps [cpal](https://crates.io/crates/cpal) for ALSA (Linux),
//! CoreAudio (macOS), WASAPI (Windows) and the other cpal hosts. cpal exposes
//! input and output as separate streams; the backend bridges them with an
//! `rtrb` sample ring so the duplex callback runs once per output callback with
//! the matching amount of captured input.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use spatia_core::Configuration;
//! use spatia_io::{AudioBackend, CpalBackend};
//!
//! let mut backend = CpalBackend::new()?.with_output_device(Some("USB".into()));
//! backend.open(&Configuration::new(48000, 256, 0, 2))?;
//! backend.set_callback(Box::new(|_input, output| output.fill(0.0)))?;
//! backend.start()?;
//! ```

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host};
use spatia_core::Configuration;

use crate::backend::{AudioBackend, DeviceInfo, DuplexCallback, StreamHandle};
use crate::init::{BackendToken, ensure_backend_initialized};
use crate::{Error, Result};

/// Captured-input ring size, in blocks.
const INPUT_RING_BLOCKS: usize = 8;

/// Extract device name via `description()` (cpal 0.17+).
fn device_name(device: &Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

struct OpenDevices {
    config: Configuration,
    input: Option<Device>,
    output: Option<Device>,
}

/// cpal-based audio backend.
///
/// Holds a [`BackendToken`] from creation until [`close`](AudioBackend::close);
/// [`open`](AudioBackend::open) takes a new one after a close.
pub struct CpalBackend {
    token: Option<BackendToken>,
    host: Host,
    input_device: Option<String>,
    output_device: Option<String>,
    open: Option<OpenDevices>,
    pending: Option<DuplexCallback>,
    streams: Vec<StreamHandle>,
}

impl CpalBackend {
    /// Creates a backend on the process-wide default host.
    pub fn new() -> Result<Self> {
        let token = ensure_backend_initialized()?;
        let host = token.host()?;
        Ok(Self {
            token: Some(token),
            host,
            input_device: None,
            output_device: None,
            open: None,
            pending: None,
            streams: Vec::new(),
        })
    }

    /// Selects the input device by index, exact name or partial name. `None`
    /// uses the system default.
    pub fn with_input_device(mut self, name: Option<String>) -> Self {
        self.input_device = name;
        self
    }

    /// Selects the output device by index, exact name or partial name. `None`
    /// uses the system default.
    pub fn with_output_device(mut self, name: Option<String>) -> Self {
        self.output_device = name;
        self
    }

    fn find_input(&self) -> Result<Device> {
        match &self.input_device {
            Some(name) => {
                let devices: Vec<_> = self
                    .host
                    .input_devices()
                    .map_err(|e| Error::Stream(e.to_string()))?
                    .collect();
                find_device_from_list(&devices, name, "input")
            }
            None => self
                .host
                .default_input_device()
                .ok_or_else(|| Error::DeviceUnavailable("no default input device".into())),
        }
    }

    fn find_output(&self) -> Result<Device> {
        match &self.output_device {
            Some(name) => {
                let devices: Vec<_> = self
                    .host
                    .output_devices()
                    .map_err(|e| Error::Stream(e.to_string()))?
                    .collect();
                find_device_from_list(&devices, name, "output")
            }
            None => self
                .host
                .default_output_device()
                .ok_or_else(|| Error::DeviceUnavailable("no default output device".into())),
        }
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn open(&mut self, config: &Configuration) -> Result<()> {
        config.validate()?;
        if self.open.is_some() {
            self.close();
        }
        if self.token.is_none() {
            self.token = Some(ensure_backend_initialized()?);
        }

        let input = if config.input_channels() > 0 {
            let device = self.find_input()?;
            check_input_format(&device, config)?;
            Some(device)
        } else {
            None
        };
        let output = if config.output_channels() > 0 {
            let device = self.find_output()?;
            check_output_format(&device, config)?;
            Some(device)
        } else {
            None
        };
        if input.is_none() && output.is_none() {
            return Err(Error::FormatUnsupported(
                "configuration opens no channels".into(),
            ));
        }

        tracing::info!(
            input = input.as_ref().and_then(|d| device_name(d).ok()),
            output = output.as_ref().and_then(|d| device_name(d).ok()),
            config = %config,
            "audio device opened"
        );
        self.open = Some(OpenDevices {
            config: *config,
            input,
            output,
        });
        Ok(())
    }

    fn set_callback(&mut self, callback: DuplexCallback) -> Result<()> {
        self.pending = Some(callback);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.open.is_none() {
            return Err(Error::InvalidState("device is not open".into()));
        }
        if !self.streams.is_empty() {
            return Err(Error::InvalidState("device is already running".into()));
        }
        let Some(mut callback) = self.pending.take() else {
            return Err(Error::InvalidState("no callback installed".into()));
        };
        let Some(open) = &self.open else {
            return Err(Error::InvalidState("device is not open".into()));
        };

        let config = open.config;
        let block = config.block_size();
        let in_channels = config.input_channels();
        let out_channels = config.output_channels();
        let stream_config = |channels: usize| cpal::StreamConfig {
            channels: channels as u16,
            sample_rate: config.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(block as u32),
        };

        let mut streams = Vec::with_capacity(2);
        match (&open.input, &open.output) {
            (Some(input), Some(output)) => {
                let (mut ring_tx, mut ring_rx) =
                    rtrb::RingBuffer::<f32>::new(block * in_channels * INPUT_RING_BLOCKS);
                let input_stream = input
                    .build_input_stream(
                        &stream_config(in_channels),
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            for &sample in data {
                                if ring_tx.push(sample).is_err() {
                                    break;
                                }
                            }
                        },
                        |err| tracing::error!(error = %err, "input stream error"),
                        None,
                    )
                    .map_err(build_error)?;

                let mut captured = vec![0.0f32; block * in_channels];
                let output_stream = output
                    .build_output_stream(
                        &stream_config(out_channels),
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            // cpal may hand out more frames than one block
                            for chunk in data.chunks_mut(block * out_channels) {
                                let frames = chunk.len() / out_channels;
                                let captured = &mut captured[..frames * in_channels];
                                for sample in captured.iter_mut() {
                                    *sample = ring_rx.pop().unwrap_or(0.0);
                                }
                                callback(captured, chunk);
                            }
                        },
                        |err| tracing::error!(error = %err, "output stream error"),
                        None,
                    )
                    .map_err(build_error)?;

                input_stream.play().map_err(play_error)?;
                output_stream.play().map_err(play_error)?;
                streams.push(StreamHandle::new(input_stream));
                streams.push(StreamHandle::new(output_stream));
            }
            (None, Some(output)) => {
                let output_stream = output
                    .build_output_stream(
                        &stream_config(out_channels),
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            callback(&[], data);
                        },
                        |err| tracing::error!(error = %err, "output stream error"),
                        None,
                    )
                    .map_err(build_error)?;
                output_stream.play().map_err(play_error)?;
                streams.push(StreamHandle::new(output_stream));
            }
            (Some(input), None) => {
                let input_stream = input
                    .build_input_stream(
                        &stream_config(in_channels),
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            callback(data, &mut []);
                        },
                        |err| tracing::error!(error = %err, "input stream error"),
                        None,
                    )
                    .map_err(build_error)?;
                input_stream.play().map_err(play_error)?;
                streams.push(StreamHandle::new(input_stream));
            }
            (None, None) => {
                return Err(Error::InvalidState("device opened without channels".into()));
            }
        }

        tracing::info!(
            in_channels,
            out_channels,
            sample_rate = config.sample_rate(),
            block,
            "audio streams started"
        );
        self.streams = streams;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.streams.is_empty() {
            self.streams.clear();
            tracing::info!("audio streams stopped");
        }
        Ok(())
    }

    fn close(&mut self) {
        self.streams.clear();
        self.pending = None;
        if self.open.take().is_some() {
            tracing::info!("audio device closed");
        }
        self.token = None;
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn is_running(&self) -> bool {
        !self.streams.is_empty()
    }
}

fn build_error(e: cpal::BuildStreamError) -> Error {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => Error::DeviceUnavailable(e.to_string()),
        cpal::BuildStreamError::StreamConfigNotSupported => {
            Error::FormatUnsupported(e.to_string())
        }
        other => Error::Stream(other.to_string()),
    }
}

fn play_error(e: cpal::PlayStreamError) -> Error {
    match e {
        cpal::PlayStreamError::DeviceNotAvailable => Error::DeviceUnavailable(e.to_string()),
        other => Error::Stream(other.to_string()),
    }
}

fn configs_error(e: cpal::SupportedStreamConfigsError) -> Error {
    match e {
        cpal::SupportedStreamConfigsError::DeviceNotAvailable => {
            Error::DeviceUnavailable(e.to_string())
        }
        other => Error::Stream(other.to_string()),
    }
}

fn supports(
    ranges: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    channels: usize,
    sample_rate: u32,
) -> bool {
    ranges.into_iter().any(|range| {
        usize::from(range.channels()) == channels
            && range.min_sample_rate() <= sample_rate
            && sample_rate <= range.max_sample_rate()
    })
}

fn check_input_format(device: &Device, config: &Configuration) -> Result<()> {
    let ranges = device.supported_input_configs().map_err(configs_error)?;
    if supports(ranges, config.input_channels(), config.sample_rate()) {
        return Ok(());
    }
    Err(Error::FormatUnsupported(format!(
        "input device does not support {} channel(s) at {} Hz",
        config.input_channels(),
        config.sample_rate()
    )))
}

fn check_output_format(device: &Device, config: &Configuration) -> Result<()> {
    let ranges = device.supported_output_configs().map_err(configs_error)?;
    if supports(ranges, config.output_channels(), config.sample_rate()) {
        return Ok(());
    }
    Err(Error::FormatUnsupported(format!(
        "output device does not support {} channel(s) at {} Hz",
        config.output_channels(),
        config.sample_rate()
    )))
}

/// Find a device from a list by index, exact name, or fuzzy match.
fn find_device_from_list(devices: &[Device], name_or_index: &str, kind: &str) -> Result<Device> {
    if let Ok(index) = name_or_index.parse::<usize>() {
        return devices.get(index).cloned().ok_or_else(|| {
            Error::DeviceNotFound(format!(
                "{} device index {} (only {} devices available)",
                kind,
                index,
                devices.len()
            ))
        });
    }

    for device in devices {
        if device_name(device).is_ok_and(|n| n == name_or_index) {
            return Ok(device.clone());
        }
    }

    let search_lower = name_or_index.to_lowercase();
    let mut matches: Vec<_> = devices
        .iter()
        .filter_map(|d| {
            device_name(d)
                .ok()
                .filter(|name| name.to_lowercase().contains(&search_lower))
                .map(|name| (d.clone(), name))
        })
        .collect();

    match matches.len() {
        0 => Err(Error::DeviceNotFound(format!(
            "no {} device matching '{}'",
            kind, name_or_index
        ))),
        1 => Ok(matches.remove(0).0),
        _ => {
            let names: Vec<_> = matches.iter().map(|(_, n)| n.as_str()).collect();
            tracing::warn!(
                search = name_or_index,
                kind,
                candidates = ?names,
                "device name is ambiguous, using first match"
            );
            Ok(matches.remove(0).0)
        }
    }
}

/// List all available audio devices on the default host.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let token = ensure_backend_initialized()?;
    let host = token.host()?;
    let mut devices = Vec::new();

    if let Ok(inputs) = host.input_devices() {
        for device in inputs {
            if let Ok(name) = device_name(&device) {
                let sample_rate = device
                    .default_input_config()
                    .map(|c| c.sample_rate())
                    .unwrap_or(48000);
                let is_output = device.default_output_config().is_ok();
                devices.push(DeviceInfo {
                    name,
                    is_input: true,
                    is_output,
                    default_sample_rate: sample_rate,
                });
            }
        }
    }

    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(name) = device_name(&device) {
                if devices.iter().any(|d| d.name == name) {
                    continue;
                }
                let sample_rate = device
                    .default_output_config()
                    .map(|c| c.sample_rate())
                    .unwrap_or(48000);
                devices.push(DeviceInfo {
                    name,
                    is_input: false,
                    is_output: true,
                    default_sample_rate: sample_rate,
                });
            }
        }
    }

    Ok(devices)
}

/// Default input and output devices of the default host.
pub fn default_devices() -> Result<(Option<DeviceInfo>, Option<DeviceInfo>)> {
    let token = ensure_backend_initialized()?;
    let host = token.host()?;

    let input = host.default_input_device().and_then(|d| {
        device_name(&d).ok().map(|name| DeviceInfo {
            name,
            is_input: true,
            is_output: false,
            default_sample_rate: d
                .default_input_config()
                .map(|c| c.sample_rate())
                .unwrap_or(48000),
        })
    });

    let output = host.default_output_device().and_then(|d| {
        device_name(&d).ok().map(|name| DeviceInfo {
            name,
            is_input: false,
            is_output: true,
            default_sample_rate: d
                .default_output_config()
                .map(|c| c.sample_rate())
                .unwrap_or(48000),
        })
    });

    Ok((input, output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpal_backend_name() {
        let backend = CpalBackend::new().unwrap();
        assert_eq!(backend.name(), "cpal");
        assert!(!backend.is_open());
        assert!(!backend.is_running());
    }

    #[test]
    fn test_list_devices() {
        // Device availability depends on the system; listing must not fail.
        assert!(list_devices().is_ok());
        assert!(default_devices().is_ok());
    }

    #[test]
    fn test_start_before_open_is_invalid() {
        let mut backend = CpalBackend::new().unwrap();
        backend.set_callback(Box::new(|_, _| {})).unwrap();
        assert!(matches!(backend.start(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_zero_config_rejected() {
        let mut backend = CpalBackend::new().unwrap();
        let err = backend
            .open(&Configuration::new(48000, 0, 0, 2))
            .unwrap_err();
        assert!(matches!(err, Error::Graph(_)));
    }
}

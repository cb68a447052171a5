//! WAV file reading and writing for interleaved multi-channel audio.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavWriter};
use spatia_core::Configuration;

use crate::{Error, Result};

/// WAV file specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    /// Number of interleaved channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bit depth per sample. 32 is written as IEEE float, anything else as
    /// integer PCM.
    pub bits_per_sample: u16,
}

impl WavSpec {
    /// 32-bit float spec matching the output side of `config`.
    pub fn for_output(config: &Configuration) -> Result<Self> {
        let channels = u16::try_from(config.output_channels())
            .ok()
            .filter(|&c| c > 0)
            .ok_or_else(|| {
                Error::InvalidState(format!(
                    "cannot write {} output channels to a WAV file",
                    config.output_channels()
                ))
            })?;
        Ok(Self {
            channels,
            sample_rate: config.sample_rate(),
            bits_per_sample: 32,
        })
    }
}

impl Default for WavSpec {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 32,
        }
    }
}

impl From<hound::WavSpec> for WavSpec {
    fn from(spec: hound::WavSpec) -> Self {
        Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
        }
    }
}

impl From<WavSpec> for hound::WavSpec {
    fn from(spec: WavSpec) -> Self {
        hound::WavSpec {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            sample_format: if spec.bits_per_sample == 32 {
                SampleFormat::Float
            } else {
                SampleFormat::Int
            },
        }
    }
}

/// Reads a WAV file as interleaved `f32` samples in `[-1, 1]`.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, WavSpec)> {
    let reader = WavReader::open(path)?;
    let spec = WavSpec::from(reader.spec());

    let samples = match reader.spec().sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };
    Ok((samples, spec))
}

/// Writes interleaved samples. A trailing partial frame is dropped.
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[f32], spec: WavSpec) -> Result<()> {
    let mut writer = WavWriter::create(path, hound::WavSpec::from(spec))?;
    let whole = samples.len() - samples.len() % usize::from(spec.channels.max(1));

    if spec.bits_per_sample == 32 {
        for &sample in &samples[..whole] {
            writer.write_sample(sample)?;
        }
    } else {
        let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
        for &sample in &samples[..whole] {
            writer.write_sample((sample * max).clamp(-max, max - 1.0) as i32)?;
        }
    }

    writer.finalize()?;
    Ok(())
}

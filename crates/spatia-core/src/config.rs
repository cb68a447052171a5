//! Engine configuration value type.
//!
//! A [`Configuration`] fixes everything a DSP path is sized for: sample rate,
//! block size and the number of hardware input and output channels. It is a
//! plain `Copy` value exchanged between the settings layer, the device backend
//! and the engine. Engines compare configurations for equality to detect a
//! swap, and any change is handled like a topology change (full rebuild).

#[cfg(not(feature = "std"))]
use alloc::format;

use core::time::Duration;

use crate::graph::GraphError;

/// Audio stream parameters shared by the engine and the device backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Configuration {
    sample_rate: u32,
    block_size: usize,
    input_channels: usize,
    output_channels: usize,
}

impl Configuration {
    /// Creates a configuration.
    ///
    /// No validation happens here; call [`validate`](Self::validate) or let the
    /// path builder reject it.
    pub const fn new(
        sample_rate: u32,
        block_size: usize,
        input_channels: usize,
        output_channels: usize,
    ) -> Self {
        Self {
            sample_rate,
            block_size,
            input_channels,
            output_channels,
        }
    }

    /// Sample rate in Hz.
    #[inline]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames per block.
    #[inline]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of hardware input channels.
    #[inline]
    pub const fn input_channels(&self) -> usize {
        self.input_channels
    }

    /// Number of hardware output channels.
    #[inline]
    pub const fn output_channels(&self) -> usize {
        self.output_channels
    }

    /// Returns a copy with a different sample rate.
    pub const fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Returns a copy with a different block size.
    pub const fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Returns a copy with different hardware channel counts.
    pub const fn with_channels(mut self, input_channels: usize, output_channels: usize) -> Self {
        self.input_channels = input_channels;
        self.output_channels = output_channels;
        self
    }

    /// Number of interleaved samples in one hardware input block.
    #[inline]
    pub const fn input_samples(&self) -> usize {
        self.block_size * self.input_channels
    }

    /// Number of interleaved samples in one hardware output block.
    #[inline]
    pub const fn output_samples(&self) -> usize {
        self.block_size * self.output_channels
    }

    /// Wall-clock duration of one block. Zero for a zero sample rate.
    pub fn block_duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.block_size as f64 / f64::from(self.sample_rate))
    }

    /// Converts a sample position into seconds.
    #[inline]
    pub fn seconds_at(&self, position: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        position as f64 / f64::from(self.sample_rate)
    }

    /// Checks that the configuration can size a DSP path.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.sample_rate == 0 {
            return Err(GraphError::InvalidConfiguration(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.block_size == 0 {
            return Err(GraphError::InvalidConfiguration(format!(
                "block size must be positive, got {}",
                self.block_size
            )));
        }
        Ok(())
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new(48000, 256, 2, 2)
    }
}

impl core::fmt::Display for Configuration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} Hz, {} frames, {} in / {} out",
            self.sample_rate, self.block_size, self.input_channels, self.output_channels
        )
    }
}

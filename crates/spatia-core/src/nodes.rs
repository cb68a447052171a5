//! Built-in nodes.
//!
//! A deliberately small set used by patches, tests and the command-line tool:
//!
//! | Node | Inputs | Outputs | Transform |
//! |------|--------|---------|-----------|
//! | [`Constant`] | 0 | n | no |
//! | [`Sine`] | 0 | 1 | no |
//! | [`Gain`] | any | any | no |
//! | [`Orbit`] | 0 | 0 | yes |
//! | [`DistanceGain`] | 1 | 1 | no |

use core::f32::consts::TAU;

use crate::config::Configuration;
use crate::node::{AudioNode, ChannelCount, NodeInputs, NodeOutputs, ProcessContext};
use crate::transform::{self, Matrix4};

/// Emits a fixed value on every output channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant {
    value: f32,
    channels: usize,
}

impl Constant {
    /// Creates a single-channel constant source.
    pub fn new(value: f32) -> Self {
        Self { value, channels: 1 }
    }

    /// Sets the number of output channels.
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    /// The emitted value.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Changes the emitted value.
    pub fn set_value(&mut self, value: f32) {
        self.value = value;
    }
}

impl AudioNode for Constant {
    fn desired_inputs(&self) -> ChannelCount {
        ChannelCount::Fixed(0)
    }

    fn desired_outputs(&self) -> ChannelCount {
        ChannelCount::Fixed(self.channels)
    }

    fn process(&mut self, _: &NodeInputs<'_>, outputs: &mut NodeOutputs<'_>, _: &ProcessContext<'_>) {
        for ch in 0..outputs.len() {
            if let Some(out) = outputs.channel_mut(ch) {
                out.fill(self.value);
            }
        }
    }
}

/// Sine oscillator.
#[derive(Debug, Clone)]
pub struct Sine {
    frequency: f32,
    amplitude: f32,
    phase: f32,
    sample_rate: f32,
}

impl Sine {
    /// Creates an oscillator at `frequency` Hz with peak `amplitude`.
    pub fn new(frequency: f32, amplitude: f32) -> Self {
        Self {
            frequency,
            amplitude,
            phase: 0.0,
            sample_rate: 48000.0,
        }
    }

    /// Oscillator frequency in Hz.
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Changes the frequency without resetting the phase.
    pub fn set_frequency(&mut self, frequency: f32) {
        self.frequency = frequency;
    }
}

impl AudioNode for Sine {
    fn desired_inputs(&self) -> ChannelCount {
        ChannelCount::Fixed(0)
    }

    fn desired_outputs(&self) -> ChannelCount {
        ChannelCount::Fixed(1)
    }

    fn prepare(&mut self, config: &Configuration) {
        self.sample_rate = config.sample_rate() as f32;
    }

    fn process(
        &mut self,
        _: &NodeInputs<'_>,
        outputs: &mut NodeOutputs<'_>,
        ctx: &ProcessContext<'_>,
    ) {
        let increment = self.frequency / self.sample_rate;
        let Some(out) = outputs.channel_mut(0) else {
            // keep the phase moving so reconnecting stays continuous
            self.phase = libm::fmodf(self.phase + increment * ctx.block_size as f32, 1.0);
            return;
        };
        for sample in out.iter_mut() {
            *sample = self.amplitude * libm::sinf(TAU * self.phase);
            self.phase += increment;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// Multiplies every input channel by a gain onto the matching output channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gain {
    gain: f32,
}

impl Gain {
    /// Creates a gain stage with a linear factor.
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    /// Linear gain factor.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Changes the gain factor.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }
}

impl AudioNode for Gain {
    fn desired_inputs(&self) -> ChannelCount {
        ChannelCount::Any
    }

    fn desired_outputs(&self) -> ChannelCount {
        ChannelCount::Any
    }

    fn process(
        &mut self,
        inputs: &NodeInputs<'_>,
        outputs: &mut NodeOutputs<'_>,
        _: &ProcessContext<'_>,
    ) {
        for ch in 0..outputs.len() {
            let input = inputs.channel(ch);
            let Some(out) = outputs.channel_mut(ch) else {
                continue;
            };
            match input {
                Some(input) => {
                    for (o, &i) in out.iter_mut().zip(input) {
                        *o = i * self.gain;
                    }
                }
                None => out.fill(0.0),
            }
        }
    }
}

/// Moves its subtree around the origin on a circle in the XY plane.
///
/// Has no audio channels; children without a transform of their own inherit
/// the orbit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orbit {
    radius: f32,
    speed_hz: f32,
}

impl Orbit {
    /// Creates an orbit of `radius` completing `speed_hz` revolutions per
    /// second.
    pub fn new(radius: f32, speed_hz: f32) -> Self {
        Self { radius, speed_hz }
    }
}

impl AudioNode for Orbit {
    fn desired_inputs(&self) -> ChannelCount {
        ChannelCount::Fixed(0)
    }

    fn desired_outputs(&self) -> ChannelCount {
        ChannelCount::Fixed(0)
    }

    fn has_transform(&self) -> bool {
        true
    }

    fn process(&mut self, _: &NodeInputs<'_>, _: &mut NodeOutputs<'_>, _: &ProcessContext<'_>) {}

    fn calculate_transform(&mut self, matrix: &mut Matrix4, time: f64) {
        let turns = libm::fmod(f64::from(self.speed_hz) * time, 1.0);
        transform::rotate_z(matrix, TAU * turns as f32);
        transform::translate(matrix, self.radius, 0.0, 0.0);
    }
}

/// Attenuates its input by the distance of its (inherited) position from the
/// origin: `gain = reference / max(distance, reference)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceGain {
    reference: f32,
}

impl DistanceGain {
    /// Creates a distance attenuator. Inside `reference` the gain is 1.
    pub fn new(reference: f32) -> Self {
        Self {
            reference: reference.max(f32::EPSILON),
        }
    }
}

impl AudioNode for DistanceGain {
    fn desired_inputs(&self) -> ChannelCount {
        ChannelCount::Fixed(1)
    }

    fn desired_outputs(&self) -> ChannelCount {
        ChannelCount::Fixed(1)
    }

    fn process(
        &mut self,
        inputs: &NodeInputs<'_>,
        outputs: &mut NodeOutputs<'_>,
        ctx: &ProcessContext<'_>,
    ) {
        let input = inputs.channel(0);
        let Some(out) = outputs.channel_mut(0) else {
            return;
        };
        let Some(input) = input else {
            out.fill(0.0);
            return;
        };
        for (i, (o, &x)) in out.iter_mut().zip(input).enumerate() {
            let [px, py, pz] = transform::position(ctx.matrix(i));
            let distance = libm::sqrtf(px * px + py * py + pz * pz);
            *o = x * self.reference / distance.max(self.reference);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformBuffer;

    fn run(
        node: &mut dyn AudioNode,
        input: Option<&[f32]>,
        transforms: &TransformBuffer,
        position: u64,
    ) -> Vec<f32> {
        let config = Configuration::new(1000, transforms.len(), 0, 1);
        node.prepare(&config);
        let ctx = ProcessContext::new(&config, position, transforms);
        let ins = [input];
        let inputs = NodeInputs::from_slices(&ins);
        let mut out = vec![0.0f32; transforms.len()];
        {
            let mut outs = [Some(&mut out[..])];
            let mut outputs = NodeOutputs::from_slices(&mut outs);
            node.process(&inputs, &mut outputs, &ctx);
        }
        out
    }

    #[test]
    fn test_constant_fills_connected_outputs() {
        let mut c = Constant::new(0.7).with_channels(2);
        assert_eq!(c.desired_outputs(), ChannelCount::Fixed(2));
        let out = run(&mut c, None, &TransformBuffer::new(4), 0);
        assert_eq!(out, vec![0.7; 4]);
    }

    #[test]
    fn test_sine_starts_at_zero_and_stays_bounded() {
        let mut s = Sine::new(250.0, 0.5);
        let out = run(&mut s, None, &TransformBuffer::new(8), 0);
        assert!(out[0].abs() < 1e-6);
        // a quarter period at 1 kHz sample rate is 1 sample
        assert!((out[1] - 0.5).abs() < 1e-5);
        assert!(out.iter().all(|s| s.abs() <= 0.5 + 1e-6));

        s.reset();
        let again = run(&mut s, None, &TransformBuffer::new(8), 0);
        assert_eq!(out, again);
    }

    #[test]
    fn test_gain_scales_and_silences_unconnected() {
        let mut g = Gain::new(2.0);
        let input = [0.1f32, 0.2, 0.3, 0.4];
        let out = run(&mut g, Some(&input[..]), &TransformBuffer::new(4), 0);
        assert_eq!(out, vec![0.2, 0.4, 0.6, 0.8]);

        let silent = run(&mut g, None, &TransformBuffer::new(4), 0);
        assert_eq!(silent, vec![0.0; 4]);
    }

    #[test]
    fn test_orbit_moves_to_radius() {
        let mut orbit = Orbit::new(2.0, 0.25);
        let mut m = crate::IDENTITY;
        orbit.calculate_transform(&mut m, 0.0);
        let [x, y, _] = transform::position(&m);
        assert!((x - 2.0).abs() < 1e-5 && y.abs() < 1e-5);

        // a quarter turn after one second
        let mut m = crate::IDENTITY;
        orbit.calculate_transform(&mut m, 1.0);
        let [x, y, _] = transform::position(&m);
        assert!(x.abs() < 1e-4 && (y - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_distance_gain_uses_inherited_position() {
        let mut node = DistanceGain::new(1.0);
        let mut transforms = TransformBuffer::new(2);
        transforms.set(0, transform::translation(0.5, 0.0, 0.0));
        transforms.set(1, transform::translation(4.0, 0.0, 0.0));
        let out = run(&mut node, Some(&[1.0f32, 1.0][..]), &transforms, 0);
        assert_eq!(out[0], 1.0);
        assert!((out[1] - 0.25).abs() < 1e-6);
    }
}

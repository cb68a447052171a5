//! Offline rendering without a device.

use std::path::Path;

use spatia_core::{AudioEngine, SampleLayout};

use crate::Result;
use crate::wav::{WavSpec, write_wav};

/// Runs `blocks` blocks through `engine` and returns the concatenated output
/// blocks, each in the engine's layout.
///
/// `input` holds consecutive input blocks in the same layout; blocks past its
/// end are fed silence.
pub fn render_blocks(engine: &mut AudioEngine, blocks: usize, input: &[f32]) -> Result<Vec<f32>> {
    let config = engine.config();
    let in_len = config.input_samples();
    let out_len = config.output_samples();

    let mut output = vec![0.0; blocks * out_len];
    let mut silence = vec![0.0; in_len];
    let mut inputs = input.chunks(in_len.max(1));

    for block in output.chunks_mut(out_len.max(1)).take(blocks) {
        let block_input = match inputs.next() {
            Some(chunk) if in_len > 0 && chunk.len() == in_len => chunk,
            Some(chunk) if in_len > 0 => {
                silence[..chunk.len()].copy_from_slice(chunk);
                silence[chunk.len()..].fill(0.0);
                &silence[..]
            }
            _ => {
                silence.fill(0.0);
                &silence[..]
            }
        };
        engine.process(block_input, block)?;
    }
    if out_len == 0 {
        // nothing to collect, but time still advances
        for _ in 0..blocks {
            engine.process(&silence, &mut [])?;
        }
    }
    Ok(output)
}

/// Renders `seconds` of output to a 32-bit float WAV file. Returns the number
/// of frames written, rounded up to whole blocks.
pub fn render_to_wav<P: AsRef<Path>>(engine: &mut AudioEngine, path: P, seconds: f64) -> Result<u64> {
    let config = engine.config();
    let spec = WavSpec::for_output(&config)?;
    let frames = (seconds.max(0.0) * f64::from(config.sample_rate())).ceil() as usize;
    let blocks = frames.div_ceil(config.block_size().max(1));

    let mut samples = render_blocks(engine, blocks, &[])?;
    if engine.layout() == SampleLayout::Planar {
        samples = interleave_blocks(&samples, config.block_size(), config.output_channels());
    }
    write_wav(&path, &samples, spec)?;

    let written = (blocks * config.block_size()) as u64;
    tracing::info!(
        path = %path.as_ref().display(),
        frames = written,
        channels = spec.channels,
        "rendered to wav"
    );
    Ok(written)
}

/// Converts consecutive planar blocks to one interleaved stream.
fn interleave_blocks(planar: &[f32], block_frames: usize, channels: usize) -> Vec<f32> {
    let mut interleaved = Vec::with_capacity(planar.len());
    for block in planar.chunks_exact(block_frames * channels) {
        for frame in 0..block_frames {
            for ch in 0..channels {
                interleaved.push(block[ch * block_frames + frame]);
            }
        }
    }
    interleaved
}

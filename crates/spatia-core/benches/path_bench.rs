//! Criterion benchmarks for DSP path building and block processing.
//!
//! Uses the built-in `Gain` node so the numbers mostly measure plan overhead:
//!
//! - **Build** - linearization, shape inference, buffer allocation
//! - **Process** - `AudioEngine::process` throughput at varying block sizes
//!
//! Run with: `cargo bench -p spatia-core -- path/`
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use spatia_core::nodes::{Constant, Gain, Orbit};
use spatia_core::{
    AudioEngine, Configuration, Connection, ConnectionTable, NodeKind, NodeTree, PathBuilder,
};

const SAMPLE_RATE: u32 = 48000;
const BLOCK_SIZE: usize = 256;
const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512, 1024];

// ---------------------------------------------------------------------------
// Scene constructors
// ---------------------------------------------------------------------------

/// Constant -> n gains -> stereo output, optionally with every gain under an
/// orbiting parent.
fn make_chain(n: usize, orbit: bool) -> (NodeTree, ConnectionTable) {
    let mut tree = NodeTree::new();
    let mut table = ConnectionTable::new();
    let parent = orbit.then(|| {
        tree.add(None, "orbit", NodeKind::Processor(Box::new(Orbit::new(2.0, 0.1))))
            .unwrap()
    });
    let source = tree
        .add(
            None,
            "dc",
            NodeKind::Processor(Box::new(Constant::new(0.5).with_channels(2))),
        )
        .unwrap();
    let mut prev = source;
    for i in 0..n {
        let node = tree
            .add(
                parent,
                &format!("gain{i}"),
                NodeKind::Processor(Box::new(Gain::new(0.99))),
            )
            .unwrap();
        table
            .connect(Connection::new(prev, 0, node, 0).with_channels(2))
            .unwrap();
        prev = node;
    }
    let out = tree.add(None, "out", NodeKind::SystemOutput).unwrap();
    table
        .connect(Connection::new(prev, 0, out, 0).with_channels(2))
        .unwrap();
    (tree, table)
}

/// `n` constants all feeding the output: one mix step with `n` sources.
fn make_fan_in(n: usize) -> (NodeTree, ConnectionTable) {
    let mut tree = NodeTree::new();
    let mut table = ConnectionTable::new();
    let out = tree.add(None, "out", NodeKind::SystemOutput).unwrap();
    for i in 0..n {
        let node = tree
            .add(
                None,
                &format!("dc{i}"),
                NodeKind::Processor(Box::new(Constant::new(0.01))),
            )
            .unwrap();
        table.connect(Connection::new(node, 0, out, 0)).unwrap();
    }
    (tree, table)
}

fn engine(config: Configuration, (tree, table): (NodeTree, ConnectionTable)) -> AudioEngine {
    let mut engine = AudioEngine::with_scene(config, tree, table);
    engine.rebuild().unwrap();
    engine
}

// ---------------------------------------------------------------------------
// Build benchmarks
// ---------------------------------------------------------------------------

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("path/build");
    let config = Configuration::new(SAMPLE_RATE, BLOCK_SIZE, 0, 2);

    for &n in &[5usize, 20, 100] {
        let (mut tree, table) = make_chain(n, false);
        group.bench_with_input(BenchmarkId::new("chain", n), &n, |b, _| {
            b.iter(|| black_box(PathBuilder::new(config).build(&mut tree, &table).unwrap()));
        });
    }

    let (mut tree, table) = make_fan_in(32);
    group.bench_function("fan_in_32", |b| {
        b.iter(|| black_box(PathBuilder::new(config).build(&mut tree, &table).unwrap()));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Process benchmarks
// ---------------------------------------------------------------------------

fn bench_process(c: &mut Criterion) {
    let mut group = c.benchmark_group("path/process");

    for &block in BLOCK_SIZES {
        let config = Configuration::new(SAMPLE_RATE, block, 0, 2);
        let mut output = vec![0.0f32; config.output_samples()];

        let mut chain = engine(config, make_chain(20, false));
        group.bench_with_input(BenchmarkId::new("chain_20", block), &block, |b, _| {
            b.iter(|| {
                chain.process(&[], &mut output).unwrap();
                black_box(&output);
            });
        });

        let mut orbiting = engine(config, make_chain(20, true));
        group.bench_with_input(BenchmarkId::new("chain_20_orbit", block), &block, |b, _| {
            b.iter(|| {
                orbiting.process(&[], &mut output).unwrap();
                black_box(&output);
            });
        });

        let mut fan_in = engine(config, make_fan_in(32));
        group.bench_with_input(BenchmarkId::new("fan_in_32", block), &block, |b, _| {
            b.iter(|| {
                fan_in.process(&[], &mut output).unwrap();
                black_box(&output);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build, bench_process);
criterion_main!(benches);

//! Live playback command.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use spatia_core::NodeKind;
use spatia_io::{CpalBackend, LiveEngine, LiveSettings};

use super::common::{SceneArgs, load_scene};

#[derive(Args)]
pub struct PlayArgs {
    #[command(flatten)]
    scene: SceneArgs,

    /// Stop after this many seconds (default: until Ctrl+C)
    #[arg(long)]
    seconds: Option<f64>,

    /// Input device name or index, overriding the settings file
    #[arg(long)]
    input_device: Option<String>,

    /// Output device name or index, overriding the settings file
    #[arg(long)]
    output_device: Option<String>,
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    let mut scene = load_scene(&args.scene)?;

    // only open a capture stream when the patch reads hardware input
    let reads_input = scene
        .engine
        .tree()
        .iter()
        .any(|node| matches!(node.kind(), NodeKind::SystemInput));
    if !reads_input {
        let config = scene.engine.config();
        scene
            .engine
            .set_config(config.with_channels(0, config.output_channels()));
    }
    let config = scene.engine.config();

    let audio = &scene.settings.audio;
    let backend = CpalBackend::new()?
        .with_input_device(args.input_device.or_else(|| audio.input_device.clone()))
        .with_output_device(args.output_device.or_else(|| audio.output_device.clone()));
    let settings = LiveSettings {
        blocks_ahead: scene.settings.live.blocks_ahead,
        layout: scene.settings.sample_layout(),
    };
    let mut live = LiveEngine::new(backend, scene.engine, settings);

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    println!("Playing {} ({})", scene.name, config);
    println!("  Blocks ahead: {}", settings.blocks_ahead);
    if args.seconds.is_none() {
        println!("\nPress Ctrl+C to stop...\n");
    }
    live.start()?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} [{elapsed_precise}] {msg}")?);
    let started = Instant::now();
    let limit = args.seconds.map(Duration::from_secs_f64);
    while running.load(Ordering::SeqCst) && limit.is_none_or(|limit| started.elapsed() < limit) {
        let stats = live.stats();
        spinner.set_message(format!(
            "{} blocks, {} queued, {} underruns",
            stats.blocks_rendered,
            live.queued_output_blocks(),
            stats.underruns
        ));
        spinner.tick();
        std::thread::sleep(Duration::from_millis(100));
    }
    spinner.finish_and_clear();

    live.stop()?;
    let stats = live.stats();
    println!("Stopped after {:.1}s", started.elapsed().as_secs_f64());
    println!("  Callbacks:      {}", stats.callbacks);
    println!("  Blocks:         {}", stats.blocks_rendered);
    println!("  Underruns:      {}", stats.underruns);
    println!("  Overruns:       {}", stats.overruns);
    println!("  Failed blocks:  {}", stats.failed_blocks);
    live.close()?;
    Ok(())
}

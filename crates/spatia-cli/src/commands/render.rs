//! Offline rendering command.

use std::path::PathBuf;

use clap::Args;
use spatia_io::render_to_wav;

use super::common::{SceneArgs, load_scene};

#[derive(Args)]
pub struct RenderArgs {
    #[command(flatten)]
    scene: SceneArgs,

    /// Output WAV file
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Duration to render in seconds
    #[arg(long, default_value = "5.0")]
    seconds: f64,
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    if !args.seconds.is_finite() || args.seconds < 0.0 {
        anyhow::bail!("--seconds must be a non-negative number");
    }
    let mut scene = load_scene(&args.scene)?;
    let config = scene.engine.config();

    println!("Rendering {} ({})...", scene.name, config);
    let frames = render_to_wav(&mut scene.engine, &args.output, args.seconds)?;

    if let Some(report) = scene.engine.last_report()
        && !report.is_clean()
    {
        println!("  {} connection(s) dropped; run `spatia plan` for details", report.dropped.len());
    }
    println!(
        "Wrote {} frames ({:.2}s) to {}",
        frames,
        frames as f64 / f64::from(config.sample_rate()),
        args.output.display()
    );
    Ok(())
}

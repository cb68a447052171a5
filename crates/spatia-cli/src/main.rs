//! spatia CLI - inspect, render and play audio graph patches.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spatia")]
#[command(author, version, about = "spatia audio graph engine CLI", long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio devices
    Devices(commands::devices::DevicesArgs),

    /// Build a patch and print its processing plan
    Plan(commands::plan::PlanArgs),

    /// Render a patch offline to a WAV file
    Render(commands::render::RenderArgs),

    /// Play a patch on the audio device
    Play(commands::play::PlayArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Devices(args) => commands::devices::run(args),
        Commands::Plan(args) => commands::plan::run(args),
        Commands::Render(args) => commands::render::run(args),
        Commands::Play(args) => commands::play::run(args),
    }
}

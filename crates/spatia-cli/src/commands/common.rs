//! Shared CLI helpers used across multiple commands.

use std::path::PathBuf;

use clap::Args;
use spatia_config::{EngineSettings, Patch};
use spatia_core::AudioEngine;

/// Patch and settings arguments shared by every command that builds a scene.
#[derive(Args)]
pub struct SceneArgs {
    /// Patch file (TOML)
    #[arg(value_name = "PATCH")]
    pub patch: PathBuf,

    /// Engine settings file (TOML)
    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    /// Sample rate, overriding the settings file
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Block size in frames, overriding the settings file
    #[arg(long)]
    pub block_size: Option<usize>,
}

/// A patch instantiated into an engine.
pub struct Scene {
    pub settings: EngineSettings,
    pub name: String,
    pub engine: AudioEngine,
}

/// Loads the settings (or defaults), applies command-line overrides and
/// builds an engine running the patch.
pub fn load_scene(args: &SceneArgs) -> anyhow::Result<Scene> {
    let mut settings = match &args.settings {
        Some(path) => EngineSettings::load(path)?,
        None => EngineSettings::default(),
    };
    if let Some(sample_rate) = args.sample_rate {
        settings.audio.sample_rate = sample_rate;
    }
    if let Some(block_size) = args.block_size {
        settings.audio.block_size = block_size;
    }
    settings.validate()?;

    let patch = Patch::load(&args.patch)?;
    let name = patch.name.clone().unwrap_or_else(|| {
        args.patch
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled".to_string())
    });
    let engine = patch
        .engine(settings.configuration())?
        .with_layout(settings.sample_layout())
        .with_output_history(settings.live.history_blocks);

    Ok(Scene {
        settings,
        name,
        engine,
    })
}

//! Integration tests for spatia-config.
//!
//! Settings and patches are written to disk, loaded back and turned into a
//! running engine.

use spatia_config::{ConfigError, ConnectionSpec, EngineSettings, Layout, NodeSpec, Patch};
use spatia_core::SampleLayout;
use tempfile::TempDir;

const MIX: &str = r#"
[[node]]
name = "a"
kind = "constant"
params = { value = 0.3 }

[[node]]
name = "b"
kind = "constant"
params = { value = "20%" }

[[node]]
name = "half"
kind = "gain"
params = { gain = 0.5 }

[[node]]
name = "out"
kind = "output"

[[connection]]
from = "a"
to = "half"

[[connection]]
from = "b"
to = "half"

[[connection]]
from = "half"
to = "out"
"#;

#[test]
fn test_settings_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.toml");

    let mut settings = EngineSettings::default();
    settings.audio.block_size = 128;
    settings.audio.output_channels = 1;
    settings.audio.layout = Layout::Planar;
    settings.live.blocks_ahead = 6;
    settings.save(&path).unwrap();

    let loaded = EngineSettings::load(&path).unwrap();
    assert_eq!(loaded, settings);
    assert_eq!(loaded.configuration().block_size(), 128);
    assert_eq!(loaded.sample_layout(), SampleLayout::Planar);
}

#[test]
fn test_missing_file_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nope.toml");
    let err = EngineSettings::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
    assert!(err.to_string().contains("nope.toml"));
}

#[test]
fn test_patch_file_runs_in_engine() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mix.toml");
    std::fs::write(&path, MIX).unwrap();

    let settings = EngineSettings::from_toml_str(
        "[audio]\nblock_size = 4\ninput_channels = 0\noutput_channels = 1\n",
    )
    .unwrap();
    let patch = Patch::load(&path).unwrap();
    let mut engine = patch.engine(settings.configuration()).unwrap();

    let mut out = [0.0; 4];
    engine.process(&[], &mut out).unwrap();
    for sample in out {
        assert!((sample - 0.25).abs() < 1e-6, "got {sample}");
    }

    let order = engine.path().unwrap().len();
    assert_eq!(order, 4);
}

#[test]
fn test_patch_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scene.toml");

    let patch = Patch::new()
        .with_node(NodeSpec::new("mover", "orbit").with_param("radius", 3.0))
        .with_node(
            NodeSpec::new("tone", "sine")
                .with_parent("mover")
                .with_param("freq", "220Hz"),
        )
        .with_node(NodeSpec::new("near", "distance_gain").with_parent("tone"))
        .with_node(NodeSpec::new("out", "output"))
        .with_connection(ConnectionSpec::new("tone", "near"))
        .with_connection(ConnectionSpec::new("near", "out"));
    patch.save(&path).unwrap();

    let loaded = Patch::load(&path).unwrap();
    assert_eq!(loaded, patch);

    let engine = loaded.engine(EngineSettings::default().configuration()).unwrap();
    assert_eq!(engine.tree().len(), 4);
    assert_eq!(engine.connections().len(), 2);
}

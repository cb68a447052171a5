//! End-to-end tests for the `spatia` binary.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const TONE: &str = r#"
name = "tone"

[[node]]
name = "osc"
kind = "sine"
params = { freq = "440Hz", amp = 0.5 }

[[node]]
name = "level"
kind = "gain"
params = { gain = "-6dB" }

[[node]]
name = "out"
kind = "output"

[[connection]]
from = "osc"
to = "level"

[[connection]]
from = "level"
to = "out"
"#;

fn spatia(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_spatia"))
        .args(args)
        .output()
        .expect("failed to run spatia")
}

fn write(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_help_lists_commands() {
    let out = spatia(&["--help"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    for command in ["devices", "plan", "render", "play"] {
        assert!(stdout.contains(command), "missing {command} in:\n{stdout}");
    }
}

#[test]
fn test_plan_prints_execution_order() {
    let dir = TempDir::new().unwrap();
    let patch = write(dir.path(), "tone.toml", TONE);

    let out = spatia(&["plan", &patch]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Patch: tone"));

    let osc = stdout.find("osc").unwrap();
    let level = stdout.find("level").unwrap();
    let output = stdout.find("out (").unwrap();
    assert!(osc < level && level < output, "{stdout}");
    assert!(stdout.contains("All 2 connection(s) routed."));
}

#[test]
fn test_plan_reports_dropped_connection() {
    let dir = TempDir::new().unwrap();
    let patch = write(
        dir.path(),
        "bad.toml",
        r#"
[[node]]
name = "osc"
kind = "sine"

[[node]]
name = "out"
kind = "output"

[[connection]]
from = "osc"
to = "out"
output = 3
"#,
    );

    let out = spatia(&["plan", &patch]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Dropped connections:"), "{stdout}");
}

#[test]
fn test_render_writes_wav() {
    let dir = TempDir::new().unwrap();
    let patch = write(dir.path(), "tone.toml", TONE);
    let wav = dir.path().join("tone.wav");

    let out = spatia(&[
        "render",
        &patch,
        "-o",
        &wav.to_string_lossy(),
        "--seconds",
        "0.1",
        "--block-size",
        "128",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let reader = hound::WavReader::open(&wav).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 48000);
    // 4800 frames rounded up to whole 128-frame blocks
    assert_eq!(reader.duration(), 4864);
}

#[test]
fn test_unknown_node_kind_fails() {
    let dir = TempDir::new().unwrap();
    let patch = write(
        dir.path(),
        "reverb.toml",
        "[[node]]\nname = \"verb\"\nkind = \"reverb\"\n",
    );

    let out = spatia(&["plan", &patch]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("unknown node kind: reverb"), "{stderr}");
}

#[test]
fn test_invalid_settings_fail() {
    let dir = TempDir::new().unwrap();
    let patch = write(dir.path(), "tone.toml", TONE);
    let settings = write(dir.path(), "engine.toml", "[live]\nblocks_ahead = 0\n");

    let out = spatia(&["plan", &patch, "--settings", &settings]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("blocks_ahead"), "{stderr}");
}

//! Engine settings file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use spatia_core::{Configuration, SampleLayout};

use crate::error::ConfigError;

/// Largest block size accepted from a settings file.
pub const MAX_BLOCK_SIZE: usize = 8192;
/// Largest channel count accepted on either side.
pub const MAX_CHANNELS: usize = 64;
/// Largest `blocks_ahead` accepted.
pub const MAX_BLOCKS_AHEAD: usize = 64;

/// Sample layout as written in settings files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// `[L0, R0, L1, R1, ...]`
    #[default]
    Interleaved,
    /// `[L0, L1, ..., R0, R1, ...]`
    Planar,
}

impl From<Layout> for SampleLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Interleaved => SampleLayout::Interleaved,
            Layout::Planar => SampleLayout::Planar,
        }
    }
}

/// `[audio]` section: device format and selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AudioSettings {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per block.
    pub block_size: usize,
    /// Hardware input channels.
    pub input_channels: usize,
    /// Hardware output channels.
    pub output_channels: usize,
    /// Input device name or index; the system default when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_device: Option<String>,
    /// Output device name or index; the system default when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device: Option<String>,
    /// Layout of the blocks the engine reads and writes.
    pub layout: Layout,
}

impl Default for AudioSettings {
    fn default() -> Self {
        let config = Configuration::default();
        Self {
            sample_rate: config.sample_rate(),
            block_size: config.block_size(),
            input_channels: config.input_channels(),
            output_channels: config.output_channels(),
            input_device: None,
            output_device: None,
            layout: Layout::Interleaved,
        }
    }
}

/// `[live]` section: real-time scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiveSection {
    /// Rendered blocks kept queued ahead of the device.
    pub blocks_ahead: usize,
    /// Blocks of output history each node keeps.
    pub history_blocks: usize,
}

impl Default for LiveSection {
    fn default() -> Self {
        Self {
            blocks_ahead: 3,
            history_blocks: 1,
        }
    }
}

/// Engine settings, stored as TOML.
///
/// # TOML Format
///
/// ```toml
/// [audio]
/// sample_rate = 48000
/// block_size = 256
/// input_channels = 0
/// output_channels = 2
/// output_device = "USB Audio"
/// layout = "interleaved"
///
/// [live]
/// blocks_ahead = 3
/// history_blocks = 1
/// ```
///
/// Missing fields take their defaults; unknown fields are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Device format and selection.
    pub audio: AudioSettings,
    /// Real-time scheduling.
    pub live: LiveSection,
}

impl EngineSettings {
    /// Load and validate settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let settings = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded engine settings");
        Ok(settings)
    }

    /// Parse and validate settings from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(toml_str)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save the settings to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Convert the settings to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks every value against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return Err(ConfigError::Validation("sample_rate must be positive".into()));
        }
        if audio.block_size == 0 || audio.block_size > MAX_BLOCK_SIZE {
            return Err(ConfigError::Validation(format!(
                "block_size {} out of range [1, {MAX_BLOCK_SIZE}]",
                audio.block_size
            )));
        }
        for (side, channels) in [
            ("input_channels", audio.input_channels),
            ("output_channels", audio.output_channels),
        ] {
            if channels > MAX_CHANNELS {
                return Err(ConfigError::Validation(format!(
                    "{side} {channels} exceeds {MAX_CHANNELS}"
                )));
            }
        }
        if audio.input_channels + audio.output_channels == 0 {
            return Err(ConfigError::Validation(
                "at least one input or output channel is required".into(),
            ));
        }
        if self.live.blocks_ahead == 0 || self.live.blocks_ahead > MAX_BLOCKS_AHEAD {
            return Err(ConfigError::Validation(format!(
                "blocks_ahead {} out of range [1, {MAX_BLOCKS_AHEAD}]",
                self.live.blocks_ahead
            )));
        }
        if self.live.history_blocks == 0 {
            return Err(ConfigError::Validation("history_blocks must be positive".into()));
        }
        Ok(())
    }

    /// The engine configuration these settings describe.
    pub fn configuration(&self) -> Configuration {
        Configuration::new(
            self.audio.sample_rate,
            self.audio.block_size,
            self.audio.input_channels,
            self.audio.output_channels,
        )
    }

    /// The engine sample layout.
    pub fn sample_layout(&self) -> SampleLayout {
        self.audio.layout.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_defaults() {
        let settings = EngineSettings::from_toml_str("").unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(settings.configuration(), Configuration::default());
        assert_eq!(settings.sample_layout(), SampleLayout::Interleaved);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let settings = EngineSettings::from_toml_str(
            r#"
            [audio]
            block_size = 64
            layout = "planar"
            output_device = "2"
            "#,
        )
        .unwrap();
        assert_eq!(settings.audio.block_size, 64);
        assert_eq!(settings.audio.sample_rate, 48000);
        assert_eq!(settings.audio.output_device.as_deref(), Some("2"));
        assert_eq!(settings.sample_layout(), SampleLayout::Planar);
        assert_eq!(settings.live, LiveSection::default());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = EngineSettings::from_toml_str("[audio]\nsamplerate = 44100\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
        let err = EngineSettings::from_toml_str("[video]\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_validation() {
        for bad in [
            "[audio]\nsample_rate = 0\n",
            "[audio]\nblock_size = 0\n",
            "[audio]\nblock_size = 100000\n",
            "[audio]\ninput_channels = 0\noutput_channels = 0\n",
            "[audio]\noutput_channels = 65\n",
            "[live]\nblocks_ahead = 0\n",
            "[live]\nhistory_blocks = 0\n",
        ] {
            let err = EngineSettings::from_toml_str(bad).unwrap_err();
            assert!(matches!(err, ConfigError::Validation(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn test_toml_string_parses_back() {
        let mut settings = EngineSettings::default();
        settings.audio.input_device = Some("mic".into());
        settings.live.blocks_ahead = 5;
        let text = settings.to_toml_string().unwrap();
        assert!(text.contains("blocks_ahead = 5"));
        assert_eq!(EngineSettings::from_toml_str(&text).unwrap(), settings);
    }
}

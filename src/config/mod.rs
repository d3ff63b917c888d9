use crate::audio::format::{AudioFormat, BitDepth};
use crate::audio::mixer::{MixMode, MixSettings};
use crate::global;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub track: TrackConfig,
    pub mixer: MixerConfig,
    pub queue: QueueConfig,
    pub diagnostics: DiagnosticsConfig,
}

/// Format of the local track the mixer renders into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    pub mic_gain: f32,
    pub custom_gain: f32,
    pub mode: MixMode,
    /// Largest block rendered in one provider pull; bigger requests are chunked.
    pub max_frames_per_callback: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Frames held before new frames are dropped. Unbounded when `bounded` is false.
    pub capacity_frames: usize,
    pub bounded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub channel_capacity: usize,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            name: "confmix".to_string(),
            sample_rate: 48_000,
            channels: 1,
            bit_depth: 16,
        }
    }
}

impl Default for MixerConfig {
    fn default() -> Self {
        let settings = MixSettings::default();
        Self {
            mic_gain: settings.mic_gain,
            custom_gain: settings.custom_gain,
            mode: settings.mode,
            max_frames_per_callback: settings.max_frames_per_callback,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity_frames: 48_000,
            bounded: true,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: 256,
        }
    }
}

impl TrackConfig {
    pub fn format(&self) -> Result<AudioFormat> {
        let bit_depth = BitDepth::from_bits(self.bit_depth)?;
        AudioFormat::new(self.sample_rate, self.channels, bit_depth)
            .context("Invalid track format")
    }
}

impl MixerConfig {
    pub fn settings(&self) -> MixSettings {
        MixSettings {
            mic_gain: self.mic_gain,
            custom_gain: self.custom_gain,
            mode: self.mode,
            max_frames_per_callback: self.max_frames_per_callback,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to load config file {:?}", path))?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let format = self.track.format()?;
        if format.bit_depth != BitDepth::Sixteen {
            bail!(
                "Track bit depth must be 16, got {}",
                format.bit_depth.bits()
            );
        }

        for (name, gain) in [
            ("mic_gain", self.mixer.mic_gain),
            ("custom_gain", self.mixer.custom_gain),
        ] {
            if !gain.is_finite() || gain < 0.0 {
                bail!("mixer.{} must be a finite non-negative number, got {}", name, gain);
            }
        }

        if self.mixer.max_frames_per_callback == 0 {
            bail!("mixer.max_frames_per_callback must be positive");
        }
        if self.queue.bounded && self.queue.capacity_frames == 0 {
            bail!("queue.capacity_frames must be positive for a bounded queue");
        }
        if self.diagnostics.channel_capacity == 0 {
            bail!("diagnostics.channel_capacity must be positive");
        }
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.track.sample_rate, 48_000);
        assert_eq!(config.track.channels, 1);
        assert_eq!(config.mixer.mode, MixMode::Additive);
        assert_eq!(config.mixer.max_frames_per_callback, 4096);
        assert_eq!(config.queue.capacity_frames, 48_000);
        assert_eq!(config.diagnostics.channel_capacity, 256);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [mixer]
            mode = "custom_only"
            mic_gain = 0.5

            [track]
            channels = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.mixer.mode, MixMode::CustomOnly);
        assert_eq!(config.mixer.mic_gain, 0.5);
        assert_eq!(config.mixer.custom_gain, 1.0);
        assert_eq!(config.track.format().unwrap(), AudioFormat::pcm16(48_000, 2).unwrap());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::from_toml_str("[mixer]\ncustom_gain = -0.5").is_err());
        assert!(Config::from_toml_str("[track]\nbit_depth = 24").is_err());
        assert!(Config::from_toml_str("[track]\nbit_depth = 12").is_err());
        assert!(Config::from_toml_str("[track]\nsample_rate = 0").is_err());
        assert!(Config::from_toml_str("[mixer]\nmode = \"louder\"").is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.mixer.mode = MixMode::Replace;
        config.queue.bounded = false;
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }
}

//! Player configuration.
//!
//! Every tunable of the pipeline lives in [`PlayerConfig`]. The struct can be
//! loaded from and saved to a TOML file; missing keys fall back to defaults.
//!
//! ```
//! use avpipe::core::PlayerConfig;
//!
//! let config = PlayerConfig::from_toml_str("prefetch_duration = 1.5\nloop_playback = true").unwrap();
//! assert_eq!(config.prefetch_duration, 1.5);
//! assert!(config.loop_playback);
//! assert_eq!(config.sync_threshold, 0.02);
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decode::hwaccel::HwBackend;

/// Error type for configuration loading and validation
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tunables of the decode and playback pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Seconds the decoder may run ahead of consumption before blocking
    pub prefetch_duration: f64,
    /// Bounded wait of `consume_video`/`consume_audio`, in milliseconds
    pub consume_timeout_ms: u64,
    /// A/V sync threshold in seconds; frames lagging by more than twice this are dropped
    pub sync_threshold: f64,
    /// Refill the audio sink when less than this many seconds are queued
    pub audio_low_watermark: f64,
    /// Stop refilling once this many seconds are queued
    pub audio_high_watermark: f64,
    /// Constant added to the audio clock before pacing video against it
    pub audio_sync_offset: f64,
    /// Poll interval of the loops while paused or starved, in milliseconds
    pub idle_wait_ms: u64,
    /// Consecutive dropped frames after which the next due frame is shown regardless
    pub max_consecutive_drops: u32,
    pub loop_playback: bool,
    pub volume: f32,
    /// Try hardware video decoders before the software one
    pub hardware_decoding: bool,
    /// Hardware backends in priority order
    pub hw_backends: Vec<HwBackend>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            prefetch_duration: 2.0,
            consume_timeout_ms: 500,
            sync_threshold: 0.02,
            audio_low_watermark: 0.2,
            audio_high_watermark: 0.4,
            audio_sync_offset: 0.0,
            idle_wait_ms: 100,
            max_consecutive_drops: 20,
            loop_playback: false,
            volume: 1.0,
            hardware_decoding: true,
            hw_backends: HwBackend::ALL.to_vec(),
        }
    }
}

impl PlayerConfig {
    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Save the configuration, creating parent directories as needed
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.prefetch_duration.is_finite() && self.prefetch_duration > 0.0) {
            return Err(invalid("prefetch_duration", "must be a positive number of seconds"));
        }
        if self.consume_timeout_ms == 0 {
            return Err(invalid("consume_timeout_ms", "must be greater than zero"));
        }
        if !(self.sync_threshold.is_finite() && self.sync_threshold > 0.0) {
            return Err(invalid("sync_threshold", "must be a positive number of seconds"));
        }
        if !(self.audio_low_watermark.is_finite() && self.audio_low_watermark >= 0.0) {
            return Err(invalid("audio_low_watermark", "must not be negative"));
        }
        if !(self.audio_high_watermark.is_finite() && self.audio_high_watermark > self.audio_low_watermark) {
            return Err(invalid(
                "audio_high_watermark",
                format!("must exceed the low watermark ({})", self.audio_low_watermark),
            ));
        }
        if !self.audio_sync_offset.is_finite() {
            return Err(invalid("audio_sync_offset", "must be finite"));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(invalid("volume", "must be within 0.0..=1.0"));
        }
        Ok(())
    }

    pub fn consume_timeout(&self) -> Duration {
        Duration::from_millis(self.consume_timeout_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlayerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.consume_timeout(), Duration::from_millis(500));
        assert_eq!(config.hw_backends.first(), Some(&HwBackend::Cuvid));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PlayerConfig::from_toml_str("volume = 0.5\nhw_backends = [\"vaapi\", \"qsv\"]").unwrap();
        assert_eq!(config.volume, 0.5);
        assert_eq!(config.hw_backends, vec![HwBackend::Vaapi, HwBackend::Qsv]);
        assert_eq!(config.prefetch_duration, 2.0);
    }

    #[test]
    fn test_inverted_watermarks_are_rejected() {
        let err = PlayerConfig::from_toml_str("audio_low_watermark = 0.5\naudio_high_watermark = 0.3").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "audio_high_watermark", .. }));
    }

    #[test]
    fn test_out_of_range_volume_is_rejected() {
        let err = PlayerConfig::from_toml_str("volume = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "volume", .. }));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let err = PlayerConfig::from_toml_str("not = valid = toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_save_and_load_preserves_values() {
        let config = PlayerConfig {
            loop_playback: true,
            sync_threshold: 0.03,
            hw_backends: vec![HwBackend::VideoToolbox],
            ..PlayerConfig::default()
        };
        let dir = tempdir().expect("failed to create temp dir");
        let path = dir.path().join("nested").join("player.toml");

        config.save_to_path(&path).expect("failed to save config");
        let loaded = PlayerConfig::load_from_path(&path).expect("failed to load config");

        assert_eq!(loaded, config);
    }
}

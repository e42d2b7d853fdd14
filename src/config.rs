use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{NavError, Result};
use crate::types::Coordinate;

/// Sapporo Station; used while no real fix has been received
pub const DEFAULT_FALLBACK: Coordinate = Coordinate {
    lat: 43.0686,
    lng: 141.3508,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub guidance: GuidanceConfig,
    pub position: PositionConfig,
    pub voice: VoiceConfig,
    pub status: StatusConfig,
}

/// Thresholds of the turn guidance state machine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuidanceConfig {
    /// Radius of the approach zone around a turn point
    pub approach_radius_m: f64,
    /// Growth over the closest distance seen that triggers the off-route advisory
    pub off_route_margin_m: f64,
    /// Number of turns in the preview list
    pub preview_count: usize,
    /// Granularity of the spoken distance to the following turn
    pub preview_rounding_m: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PositionConfig {
    pub enable_high_accuracy: bool,
    pub timeout_ms: u64,
    pub maximum_age_ms: u64,
    pub poll_interval_ms: u64,
    pub fallback: Option<Coordinate>,
    pub silence_threshold_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    pub enabled: bool,
    pub command: String,
    pub language: String,
    pub rate: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StatusConfig {
    /// Where to write the guidance snapshot after every processed event
    pub path: Option<PathBuf>,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            approach_radius_m: 30.0,
            off_route_margin_m: 50.0,
            preview_count: 3,
            preview_rounding_m: 10.0,
        }
    }
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout_ms: 10_000,
            maximum_age_ms: 3_000,
            poll_interval_ms: 1_000,
            fallback: Some(DEFAULT_FALLBACK),
            silence_threshold_secs: 30,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "termux-tts-speak".to_string(),
            language: "en-US".to_string(),
            rate: 1.0,
        }
    }
}

impl GuidanceConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.approach_radius_m > 0.0) {
            return Err(invalid("guidance.approach_radius_m", "must be positive"));
        }
        if !(self.off_route_margin_m >= 0.0) {
            return Err(invalid("guidance.off_route_margin_m", "must not be negative"));
        }
        if self.preview_count == 0 {
            return Err(invalid("guidance.preview_count", "must be at least 1"));
        }
        if !(self.preview_rounding_m > 0.0) {
            return Err(invalid("guidance.preview_rounding_m", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> NavError {
    NavError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

impl Config {
    /// Load and validate configuration from a TOML file.
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(NavError::ConfigFileNotFound {
                    path: path.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let config: Config = toml::from_str(&contents)?;
        config.guidance.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(NavError::ConfigFileNotFound { path }) => {
                log::debug!("No config at {}, using defaults", path);
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// - SHAPERUN_APPROACH_RADIUS → guidance.approach_radius_m
    /// - SHAPERUN_VOICE_COMMAND → voice.command
    /// - SHAPERUN_STATUS_PATH → status.path
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(radius) = std::env::var("SHAPERUN_APPROACH_RADIUS") {
            match radius.parse::<f64>() {
                Ok(value) if value > 0.0 => self.guidance.approach_radius_m = value,
                _ => log::warn!("Ignoring SHAPERUN_APPROACH_RADIUS={:?}", radius),
            }
        }

        if let Ok(command) = std::env::var("SHAPERUN_VOICE_COMMAND") {
            if !command.is_empty() {
                self.voice.command = command;
            }
        }

        if let Ok(path) = std::env::var("SHAPERUN_STATUS_PATH") {
            if !path.is_empty() {
                self.status.path = Some(PathBuf::from(path));
            }
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.guidance.approach_radius_m, 30.0);
        assert_eq!(config.guidance.off_route_margin_m, 50.0);
        assert_eq!(config.guidance.preview_count, 3);
        assert_eq!(config.position.timeout_ms, 10_000);
        assert_eq!(config.position.maximum_age_ms, 3_000);
        assert!(config.position.enable_high_accuracy);
        assert_eq!(config.position.fallback, Some(DEFAULT_FALLBACK));
        assert!(config.status.path.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[guidance]\napproach_radius_m = 25.0\n\n[voice]\nlanguage = \"ja-JP\""
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.guidance.approach_radius_m, 25.0);
        assert_eq!(config.guidance.off_route_margin_m, 50.0);
        assert_eq!(config.voice.language, "ja-JP");
        assert_eq!(config.voice.command, "termux-tts-speak");
    }

    #[test]
    fn test_missing_file() {
        let path = Path::new("/nonexistent/shaperun/config.toml");
        assert!(matches!(
            Config::load(path),
            Err(NavError::ConfigFileNotFound { .. })
        ));
        assert_eq!(Config::load_or_default(path).unwrap(), Config::default());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[guidance\napproach_radius_m = ").unwrap();
        assert!(matches!(
            Config::load_or_default(file.path()),
            Err(NavError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_rejects_non_positive_radius() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[guidance]\napproach_radius_m = 0.0").unwrap();
        match Config::load(file.path()) {
            Err(NavError::ConfigInvalidValue { key, .. }) => {
                assert_eq!(key, "guidance.approach_radius_m")
            }
            other => panic!("expected invalid value, got {:?}", other),
        }
    }

    #[test]
    fn test_fallback_override() {
        let config: Config = toml::from_str("[position]\nfallback = { lat = 35.0, lng = 139.0 }").unwrap();
        assert_eq!(config.position.fallback, Some(Coordinate::new(35.0, 139.0)));
    }
}

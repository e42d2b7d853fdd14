use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Navigation error types
#[derive(Error, Debug)]
pub enum NavError {
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Failed to load trace {path}: {message}")]
    Trace { path: String, message: String },

    #[error("Location failed: {0}")]
    Location(#[from] LocationError),

    #[error("Orientation sensor failed: {0}")]
    Orientation(String),

    #[error("Speech synthesis failed: {0}")]
    Speech(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NavError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationErrorCode {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

/// Failure reported by the platform location service
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct LocationError {
    pub code: LocationErrorCode,
    #[serde(default)]
    pub message: String,
}

impl LocationError {
    pub fn new(code: LocationErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_error_display() {
        let error = LocationError::new(LocationErrorCode::Timeout, "no fix within 10s");
        assert_eq!(error.to_string(), "Timeout: no fix within 10s");

        let wrapped = NavError::from(error);
        assert_eq!(wrapped.to_string(), "Location failed: Timeout: no fix within 10s");
    }

    #[test]
    fn test_invalid_value_display() {
        let error = NavError::ConfigInvalidValue {
            key: "guidance.approach_radius_m".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for guidance.approach_radius_m: must be positive"
        );
    }
}

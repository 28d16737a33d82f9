//! Error types and handling for the energy monitor
//!
//! This module defines the error taxonomy shared by the light sampling and
//! price resolution subsystems. Remote and offline failures are recovered by
//! the fallback policy; only configuration errors are fatal.

use thiserror::Error;

/// Result type alias for energy monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Main error type for the energy monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Light sensor hardware could not be read
    #[error("Sensor unavailable: {message}")]
    SensorUnavailable { message: String },

    /// Network-related errors (connect, transport, non-auth HTTP failures)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Authentication/authorization errors
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Offline snapshot file does not exist
    #[error("Offline price file missing: {path}")]
    OfflineFileMissing { path: String },

    /// Offline snapshot exists but could not be parsed
    #[error("Malformed offline data: {message}")]
    MalformedOfflineData { message: String },

    /// Tariff name is not one of the recognized tariffs
    #[error("Unknown tariff: {name}")]
    UnknownTariff { name: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl MonitorError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        MonitorError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        MonitorError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new sensor error
    pub fn sensor<S: Into<String>>(message: S) -> Self {
        MonitorError::SensorUnavailable {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        MonitorError::Network {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        MonitorError::Auth {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        MonitorError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new missing offline file error
    pub fn offline_missing<S: Into<String>>(path: S) -> Self {
        MonitorError::OfflineFileMissing { path: path.into() }
    }

    /// Create a new malformed offline data error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        MonitorError::MalformedOfflineData {
            message: message.into(),
        }
    }

    /// Create a new unknown tariff error
    pub fn unknown_tariff<S: Into<String>>(name: S) -> Self {
        MonitorError::UnknownTariff { name: name.into() }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        MonitorError::Io {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        MonitorError::Generic {
            message: message.into(),
        }
    }

    /// Remote failures that send the fallback policy to the offline snapshot
    pub fn is_retryable_remote(&self) -> bool {
        matches!(
            self,
            MonitorError::Network { .. } | MonitorError::Auth { .. } | MonitorError::Timeout { .. }
        )
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for MonitorError {
    fn from(err: serde_yaml::Error) -> Self {
        MonitorError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return MonitorError::timeout(err.to_string());
        }
        if let Some(status) = err.status()
            && (status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN)
        {
            return MonitorError::auth(err.to_string());
        }
        MonitorError::network(err.to_string())
    }
}

impl From<csv::Error> for MonitorError {
    fn from(err: csv::Error) -> Self {
        MonitorError::malformed(err.to_string())
    }
}

impl From<chrono::ParseError> for MonitorError {
    fn from(err: chrono::ParseError) -> Self {
        MonitorError::validation("datetime", err.to_string().as_str())
    }
}

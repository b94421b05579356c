//! Unified error handling for the trail-tracker library.
//!
//! Only configuration errors are meant to reach the caller as request
//! failures. Everything else is recovered locally by the layer that sees it
//! (cache misses, degraded reports), and this type is how those layers report
//! what went wrong before recovering.

use thiserror::Error;

/// Unified error type for trail-tracker operations.
#[derive(Debug, Clone, Error)]
pub enum TrailError {
    /// Missing or invalid configuration value
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Reference trail polyline could not be built
    #[error("Invalid trail reference: {message}")]
    InvalidTrail { message: String },

    /// Point store failed to list or load pings
    #[error("Point store error: {message}")]
    Store { message: String },

    /// Cache store failed to read or write
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// Weather provider failed
    #[error("Weather lookup failed: {message}")]
    Weather { message: String },

    /// Payload could not be (de)serialized
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// SQLite persistence error
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// HTTP/API error
    #[error("HTTP error{}: {message}", status_suffix(.status_code))]
    Http {
        message: String,
        status_code: Option<u16>,
    },
}

fn status_suffix(status_code: &Option<u16>) -> String {
    match status_code {
        Some(code) => format!(" ({})", code),
        None => String::new(),
    }
}

impl TrailError {
    pub fn config(message: impl Into<String>) -> Self {
        TrailError::Config {
            message: message.into(),
        }
    }

    pub fn invalid_trail(message: impl Into<String>) -> Self {
        TrailError::InvalidTrail {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        TrailError::Store {
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        TrailError::Cache {
            message: message.into(),
        }
    }

    pub fn weather(message: impl Into<String>) -> Self {
        TrailError::Weather {
            message: message.into(),
        }
    }

    /// Whether this error should fail the request instead of degrading it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrailError::Config { .. })
    }
}

impl From<serde_json::Error> for TrailError {
    fn from(err: serde_json::Error) -> Self {
        TrailError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for TrailError {
    fn from(err: rusqlite::Error) -> Self {
        TrailError::Persistence {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for TrailError {
    fn from(err: reqwest::Error) -> Self {
        TrailError::Http {
            status_code: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Result type alias for trail-tracker operations.
pub type Result<T> = std::result::Result<T, TrailError>;

/// Extension trait for converting Option to TrailError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a missing-configuration error.
    fn ok_or_missing_config(self, name: &str) -> Result<T>;

    /// Convert Option to Result with an invalid-trail error.
    fn ok_or_invalid_trail(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_missing_config(self, name: &str) -> Result<T> {
        self.ok_or_else(|| TrailError::Config {
            message: format!("missing required value '{}'", name),
        })
    }

    fn ok_or_invalid_trail(self, message: &str) -> Result<T> {
        self.ok_or_else(|| TrailError::InvalidTrail {
            message: message.to_string(),
        })
    }
}

//! Custom error types for autokeypad.
//!
//! Every fallible operation in the library returns [`MacroError`]. The
//! playback core never lets one of these escape to the operator: the
//! scheduler logs them and keeps going.

use std::io;
use thiserror::Error;

/// Main error type for autokeypad operations.
#[derive(Error, Debug)]
pub enum MacroError {
    /// The token does not name a key, function key or mouse button.
    #[error("invalid token '{token}': {reason}")]
    InvalidToken { token: String, reason: String },

    /// Error reading or parsing a persisted macro file.
    #[error("failed to load config from '{path}': {reason}")]
    ConfigLoad { path: String, reason: String },

    /// Error writing a persisted macro file.
    #[error("failed to save config to '{path}': {reason}")]
    ConfigSave { path: String, reason: String },

    /// The input driver could not press or release an action.
    #[error("failed to drive '{action}': {reason}")]
    Driver { action: String, reason: String },

    /// Platform-specific operation is not supported.
    #[error("operation not supported on this platform: {0}")]
    UnsupportedPlatform(String),

    /// Error registering or handling the toggle hotkey.
    #[error("hotkey error: {0}")]
    Hotkey(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for autokeypad operations.
pub type Result<T> = std::result::Result<T, MacroError>;

impl MacroError {
    /// Create a new InvalidToken error.
    pub fn invalid_token(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidToken {
            token: token.into(),
            reason: reason.into(),
        }
    }

    /// Create a new ConfigLoad error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new ConfigSave error.
    pub fn config_save(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigSave {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new Driver error.
    pub fn driver(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Driver {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Create a new UnsupportedPlatform error.
    pub fn unsupported_platform(message: impl Into<String>) -> Self {
        Self::UnsupportedPlatform(message.into())
    }

    /// Create a new Hotkey error.
    pub fn hotkey(message: impl Into<String>) -> Self {
        Self::Hotkey(message.into())
    }
}

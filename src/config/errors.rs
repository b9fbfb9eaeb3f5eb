//! Configuration error types
//!
//! Error codes:
//! - FG_CONFIG_READ
//! - FG_CONFIG_PARSE
//! - FG_CONFIG_INVALID
//!
//! Configuration errors surface before any run starts.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error("invalid config JSON in '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid config value for '{key}': {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "FG_CONFIG_READ",
            ConfigError::Parse { .. } => "FG_CONFIG_PARSE",
            ConfigError::Invalid { .. } => "FG_CONFIG_INVALID",
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

//! Contract registry error types
//!
//! Error codes:
//! - FG_SCHEMA_NOT_FOUND
//! - FG_DUPLICATE_VERSION
//! - FG_INVALID_CONTRACT
//! - FG_CONTRACT_STORAGE
//!
//! All of them are configuration-time errors and fatal to a run.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("schema version '{0}' not found")]
    SchemaNotFound(String),

    #[error("schema version '{0}' is already published with a different definition")]
    DuplicateVersion(String),

    #[error("invalid contract '{version}': {reason}")]
    InvalidContract { version: String, reason: String },

    #[error("contract storage error at '{path}': {reason}")]
    Storage { path: String, reason: String },
}

impl ContractError {
    pub fn storage(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            ContractError::SchemaNotFound(_) => "FG_SCHEMA_NOT_FOUND",
            ContractError::DuplicateVersion(_) => "FG_DUPLICATE_VERSION",
            ContractError::InvalidContract { .. } => "FG_INVALID_CONTRACT",
            ContractError::Storage { .. } => "FG_CONTRACT_STORAGE",
        }
    }
}

/// Result type for registry operations
pub type ContractResult<T> = Result<T, ContractError>;

//! CLI error types
//!
//! Every subsystem error a command can hit is wrapped here and keeps its
//! own code; CLI-only failures get FG_CLI_* codes.

use std::io;

use thiserror::Error;

use crate::baseline::BaselineError;
use crate::config::ConfigError;
use crate::contract::ContractError;
use crate::pipeline::{IngestionError, PipelineError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Baseline(#[from] BaselineError),

    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("invalid argument '{arg}': {reason}")]
    InvalidArgument { arg: String, reason: String },

    #[error("run {run_id} failed with {code}")]
    RunFailed { run_id: String, code: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    pub fn invalid_argument(arg: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg: arg.into(),
            reason: reason.into(),
        }
    }

    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(e) => e.code(),
            CliError::Contract(e) => e.code(),
            CliError::Baseline(e) => e.code(),
            CliError::Ingestion(_) => "FG_INGESTION",
            CliError::Pipeline(e) => e.code(),
            CliError::InvalidArgument { .. } => "FG_CLI_INVALID_ARGUMENT",
            CliError::RunFailed { .. } => "FG_CLI_RUN_FAILED",
            CliError::Io(_) => "FG_CLI_IO",
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::Io(io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_errors_keep_their_code() {
        let err: CliError = ContractError::SchemaNotFound("v9".into()).into();
        assert_eq!(err.code(), "FG_SCHEMA_NOT_FOUND");
        assert_eq!(err.to_string(), "schema version 'v9' not found");
    }

    #[test]
    fn test_cli_codes() {
        assert_eq!(
            CliError::invalid_argument("--start", "bad date").code(),
            "FG_CLI_INVALID_ARGUMENT"
        );
        let err = CliError::RunFailed {
            run_id: "r".into(),
            code: "FG_DRIFT_GATE".into(),
        };
        assert_eq!(err.code(), "FG_CLI_RUN_FAILED");
    }
}

//! Transform stage error types
//!
//! Error codes:
//! - FG_TRANSFORM_CONFIG
//! - FG_TRANSFORM_TIMESTAMP
//! - FG_TRANSFORM_NOT_NUMERIC

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("invalid transform configuration: {0}")]
    InvalidConfig(String),

    #[error("step '{step}': field '{field}' holds '{value}', not a timestamp")]
    InvalidTimestamp {
        step: String,
        field: String,
        value: String,
    },

    #[error("step '{step}': field '{field}' holds '{value}', not a number")]
    NotNumeric {
        step: String,
        field: String,
        value: String,
    },
}

impl TransformError {
    pub fn code(&self) -> &'static str {
        match self {
            TransformError::InvalidConfig(_) => "FG_TRANSFORM_CONFIG",
            TransformError::InvalidTimestamp { .. } => "FG_TRANSFORM_TIMESTAMP",
            TransformError::NotNumeric { .. } => "FG_TRANSFORM_NOT_NUMERIC",
        }
    }
}

pub type TransformResult<T> = Result<T, TransformError>;

//! Baseline store error types
//!
//! Error codes:
//! - FG_NO_BASELINE (advisory: the caller skips drift)
//! - FG_EMPTY_WINDOW
//! - FG_BASELINE_STORAGE
//! - FG_BASELINE_NON_FINITE

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BaselineError {
    #[error("no baseline recorded for schema version '{0}'")]
    NoBaseline(String),

    #[error("recalibration window for schema version '{0}' has no accepted records")]
    EmptyWindow(String),

    #[error("baseline storage error at '{path}': {reason}")]
    Storage { path: String, reason: String },

    #[error("baseline for schema version '{schema_version}' has non-finite statistics on field '{field}'")]
    NonFinite { schema_version: String, field: String },
}

impl BaselineError {
    pub fn storage(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            BaselineError::NoBaseline(_) => "FG_NO_BASELINE",
            BaselineError::EmptyWindow(_) => "FG_EMPTY_WINDOW",
            BaselineError::Storage { .. } => "FG_BASELINE_STORAGE",
            BaselineError::NonFinite { .. } => "FG_BASELINE_NON_FINITE",
        }
    }

    /// Missing baselines degrade drift monitoring, they never fail a run.
    pub fn is_advisory(&self) -> bool {
        matches!(self, BaselineError::NoBaseline(_))
    }
}

pub type BaselineResult<T> = Result<T, BaselineError>;

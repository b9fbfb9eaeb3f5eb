//! Pipeline error types
//!
//! Error codes:
//! - FG_INGESTION, FG_PERSISTENCE (retried while transient)
//! - FG_STAGE_TIMEOUT (retried)
//! - FG_DEGENERATE_BATCH (fatal, never retried)
//! - FG_DRIFT_GATE
//! - FG_CANCELLED
//! - FG_LEDGER
//! - FG_INTERNAL
//!
//! Contract, baseline and transform errors keep their own codes.

use thiserror::Error;

use super::run::Stage;
use crate::baseline::BaselineError;
use crate::contract::ContractError;
use crate::drift::DriftSeverity;
use crate::transform::TransformError;

/// Failure reported by an ingestion source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ingestion failed: {message}")]
pub struct IngestionError {
    pub message: String,
    /// Worth another attempt (I/O hiccup, timeout upstream)
    pub transient: bool,
}

impl IngestionError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

/// Failure reported by a persistence sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("persistence failed: {message}")]
pub struct PersistenceError {
    pub message: String,
    pub transient: bool,
}

impl PersistenceError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

/// Classifies an I/O error kind as worth retrying.
pub(crate) fn io_is_transient(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        kind,
        Interrupted | TimedOut | WouldBlock | ConnectionReset | ConnectionAborted | BrokenPipe
    )
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Baseline(#[from] BaselineError),

    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("stage {stage} timed out after {timeout_ms} ms")]
    Timeout { stage: Stage, timeout_ms: u64 },

    #[error(
        "degenerate batch: {accepted} of {total} records accepted ({accepted_fraction:.3}), minimum is {min_accept_ratio:.3}"
    )]
    DegenerateBatch {
        accepted: usize,
        total: usize,
        accepted_fraction: f64,
        min_accept_ratio: f64,
    },

    #[error("drift gate closed: overall severity {0}")]
    DriftGate(DriftSeverity),

    #[error("run cancelled before stage {0}")]
    Cancelled(Stage),

    #[error("run ledger write failed: {0}")]
    Ledger(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Contract(e) => e.code(),
            PipelineError::Baseline(e) => e.code(),
            PipelineError::Ingestion(_) => "FG_INGESTION",
            PipelineError::Persistence(_) => "FG_PERSISTENCE",
            PipelineError::Transform(e) => e.code(),
            PipelineError::Timeout { .. } => "FG_STAGE_TIMEOUT",
            PipelineError::DegenerateBatch { .. } => "FG_DEGENERATE_BATCH",
            PipelineError::DriftGate(_) => "FG_DRIFT_GATE",
            PipelineError::Cancelled(_) => "FG_CANCELLED",
            PipelineError::Ledger(_) => "FG_LEDGER",
            PipelineError::Internal(_) => "FG_INTERNAL",
        }
    }

    /// True if the retry policy may attempt the operation again.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Ingestion(e) => e.transient,
            PipelineError::Persistence(e) => e.transient,
            PipelineError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Errors that end the run whatever the stage's failure policy says.
    pub fn is_hard_stop(&self) -> bool {
        matches!(
            self,
            PipelineError::DegenerateBatch { .. }
                | PipelineError::DriftGate(_)
                | PipelineError::Cancelled(_)
                | PipelineError::Ledger(_)
                | PipelineError::Internal(_)
        )
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PipelineError::from(IngestionError::transient("reset")).is_transient());
        assert!(!PipelineError::from(IngestionError::permanent("gone")).is_transient());
        assert!(PipelineError::Timeout {
            stage: Stage::Persist,
            timeout_ms: 10
        }
        .is_transient());
        assert!(!PipelineError::Cancelled(Stage::Drift).is_transient());
    }

    #[test]
    fn test_codes_delegate_to_subsystems() {
        let e = PipelineError::from(BaselineError::NoBaseline("v9".into()));
        assert_eq!(e.code(), "FG_NO_BASELINE");
        let e = PipelineError::from(ContractError::SchemaNotFound("v9".into()));
        assert_eq!(e.code(), "FG_SCHEMA_NOT_FOUND");
    }

    #[test]
    fn test_degenerate_batch_is_hard_stop() {
        let e = PipelineError::DegenerateBatch {
            accepted: 850,
            total: 1000,
            accepted_fraction: 0.85,
            min_accept_ratio: 0.9,
        };
        assert!(e.is_hard_stop());
        assert!(!e.is_transient());
        assert_eq!(e.code(), "FG_DEGENERATE_BATCH");
        assert!(e.to_string().contains("850 of 1000"));
    }

    #[test]
    fn test_io_kinds() {
        assert!(io_is_transient(std::io::ErrorKind::TimedOut));
        assert!(!io_is_transient(std::io::ErrorKind::NotFound));
    }
}

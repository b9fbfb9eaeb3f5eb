//! Observable pipeline events
//!
//! Events are explicit and typed. Each serializes as its uppercase name.

use std::fmt;

use serde::{Serialize, Serializer};

/// Observable events in a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    // Setup
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Contract directory loaded
    SchemasLoaded,
    /// Contract published to the registry
    ContractRegistered,

    // Run lifecycle
    /// Run started
    RunBegin,
    /// Run finished with succeeded or partially_succeeded
    RunComplete,
    /// Run finished with failed
    RunFailed,
    /// Run ledger append failed
    LedgerWriteFailed,

    // Stages
    /// Stage started
    StageBegin,
    /// Stage finished
    StageComplete,
    /// Stage error tolerated by a skip-and-continue policy
    StageSkipped,
    /// Stage error that ends the run
    StageFailed,
    /// Stage scope dropped without an outcome
    StageIncomplete,
    /// Transient I/O failure, another attempt follows
    RetryScheduled,

    // Data quality
    /// Records quarantined by the validator
    ValidationRejections,
    /// Drift report computed
    DriftReport,
    /// Drift not evaluated (no baseline)
    DriftSkipped,
    /// New baseline stored
    BaselineRecalibrated,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::SchemasLoaded => "SCHEMAS_LOADED",
            Event::ContractRegistered => "CONTRACT_REGISTERED",

            Event::RunBegin => "RUN_BEGIN",
            Event::RunComplete => "RUN_COMPLETE",
            Event::RunFailed => "RUN_FAILED",
            Event::LedgerWriteFailed => "LEDGER_WRITE_FAILED",

            Event::StageBegin => "STAGE_BEGIN",
            Event::StageComplete => "STAGE_COMPLETE",
            Event::StageSkipped => "STAGE_SKIPPED",
            Event::StageFailed => "STAGE_FAILED",
            Event::StageIncomplete => "STAGE_INCOMPLETE",
            Event::RetryScheduled => "RETRY_SCHEDULED",

            Event::ValidationRejections => "VALIDATION_REJECTIONS",
            Event::DriftReport => "DRIFT_REPORT",
            Event::DriftSkipped => "DRIFT_SKIPPED",
            Event::BaselineRecalibrated => "BASELINE_RECALIBRATED",
        }
    }

    /// Returns true if this event ends a run unsuccessfully
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, Event::RunFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

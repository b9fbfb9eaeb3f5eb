//! Contract validation subsystem
//!
//! Partitions each batch into accepted records and quarantined records with a
//! complete diagnosis. Record-level violations never abort a batch.

mod counters;
mod outcome;
mod validator;

pub use counters::{CountersSnapshot, ViolationCounters};
pub use outcome::{RejectedRecord, ValidationOutcome, ValidationReport, Violation, ViolationRule};
pub use validator::{ContractValidator, ExtraFieldPolicy};

//! Baseline snapshot and recalibration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{BaselineError, BaselineResult};
use crate::contract::Contract;
use crate::record::Record;
use crate::stats::{compute_batch_statistics, BatchStatistics, FieldStatistic};
use crate::validation::{ContractValidator, ExtraFieldPolicy, ViolationCounters};

/// Reference statistics for one schema version.
///
/// Immutable once built. A new calibration produces a new `Baseline` that
/// replaces the old one wholesale in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub schema_version: String,
    pub fields: BatchStatistics,
    pub computed_at: DateTime<Utc>,
    /// Accepted records the statistics were computed from
    pub sample_size: u64,
}

impl Baseline {
    pub fn new(
        schema_version: impl Into<String>,
        fields: BatchStatistics,
        computed_at: DateTime<Utc>,
        sample_size: u64,
    ) -> Self {
        Self {
            schema_version: schema_version.into(),
            fields,
            computed_at,
            sample_size,
        }
    }

    /// Builds a baseline from a trusted window of records.
    ///
    /// Only records that pass the contract contribute; the window is
    /// validated with extra fields ignored since they carry no statistic.
    pub fn recalibrate(
        contract: &Contract,
        trusted_records: Vec<Record>,
        computed_at: DateTime<Utc>,
    ) -> BaselineResult<Self> {
        let validator = ContractValidator::new(ExtraFieldPolicy::Ignore);
        let report = validator.validate(trusted_records, contract, &ViolationCounters::new());
        if report.accepted.is_empty() {
            return Err(BaselineError::EmptyWindow(contract.schema_version.clone()));
        }

        let fields = compute_batch_statistics(&report.accepted, contract);
        let baseline = Self::new(
            contract.schema_version.clone(),
            fields,
            computed_at,
            report.accepted.len() as u64,
        );
        baseline.ensure_finite()?;
        Ok(baseline)
    }

    /// Refuses statistics that overflowed. They would serialize as `null`
    /// and could never be read back from the baseline log.
    pub fn ensure_finite(&self) -> BaselineResult<()> {
        match self.fields.iter().find(|(_, stat)| !stat.is_finite()) {
            Some((field, _)) => Err(BaselineError::NonFinite {
                schema_version: self.schema_version.clone(),
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldStatistic> {
        self.fields.get(name)
    }
}

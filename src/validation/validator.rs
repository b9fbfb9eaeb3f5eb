//! Contract validator
//!
//! Validation semantics:
//! - Every field rule is evaluated for every record; no early exit
//! - A record is accepted only with zero violations
//! - Records are independent, so the batch is checked data-parallel
//! - Order of the input is preserved in both partitions
//!
//! Type rules:
//! - int accepts integers only, float accepts integers and floats
//! - timestamp accepts RFC 3339, `YYYY-MM-DD` or integer Unix seconds
//! - non-finite floats are invalid regardless of nullability unless the
//!   field opts into `nan_as_missing`
//! - an array or object value is a type violation for a declared field and
//!   an extra-field violation otherwise

use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::counters::ViolationCounters;
use super::outcome::{RejectedRecord, ValidationOutcome, ValidationReport, Violation, ViolationRule};
use crate::contract::{Contract, FieldSpec, FieldType, NumericRange};
use crate::record::{Record, Value};

/// What to do with keys the contract does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtraFieldPolicy {
    /// Undeclared keys are a violation
    #[default]
    Reject,
    /// Undeclared keys are tolerated and left in place
    Ignore,
}

/// Validates records against a contract. Stateless apart from its policy;
/// counters are owned by the run and passed in.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContractValidator {
    extra_field_policy: ExtraFieldPolicy,
}

impl ContractValidator {
    pub fn new(extra_field_policy: ExtraFieldPolicy) -> Self {
        Self { extra_field_policy }
    }

    pub fn extra_field_policy(&self) -> ExtraFieldPolicy {
        self.extra_field_policy
    }

    /// Partitions a batch into accepted and rejected records.
    ///
    /// `accepted.len() + rejected.len() == batch.len()` always holds.
    pub fn validate(
        &self,
        batch: Vec<Record>,
        contract: &Contract,
        counters: &ViolationCounters,
    ) -> ValidationReport {
        let declared: HashSet<&str> = contract.fields.iter().map(|f| f.name.as_str()).collect();

        let classified: Vec<(Record, ValidationOutcome)> = batch
            .into_par_iter()
            .map(|record| {
                let outcome = self.check(&record, contract, &declared);
                for violation in &outcome.violations {
                    counters.increment(violation.rule);
                }
                counters.record_checked(!outcome.accepted);
                (record, outcome)
            })
            .collect();

        let mut report = ValidationReport::default();
        for (record, outcome) in classified {
            if outcome.accepted {
                report.accepted.push(record);
            } else {
                report.rejected.push(RejectedRecord { record, outcome });
            }
        }
        report
    }

    /// Validates a single record.
    pub fn validate_record(&self, record: &Record, contract: &Contract) -> ValidationOutcome {
        let declared: HashSet<&str> = contract.fields.iter().map(|f| f.name.as_str()).collect();
        self.check(record, contract, &declared)
    }

    fn check(&self, record: &Record, contract: &Contract, declared: &HashSet<&str>) -> ValidationOutcome {
        let mut violations = Vec::new();

        if record.schema_version != contract.schema_version {
            violations.push(Violation::new(
                "$schema_version",
                ViolationRule::SchemaVersion,
                Some(Value::Str(record.schema_version.clone())),
            ));
        }

        for spec in &contract.fields {
            if record.non_scalar.contains(&spec.name) {
                violations.push(Violation::new(&spec.name, ViolationRule::Type, None));
                continue;
            }
            check_field(spec, record.get(&spec.name), &mut violations);
        }

        if self.extra_field_policy == ExtraFieldPolicy::Reject {
            // Both key sets are ordered, so extra-field violations come out sorted by name
            let mut extras: Vec<(&String, Option<&Value>)> = record
                .values
                .iter()
                .map(|(key, value)| (key, Some(value)))
                .chain(record.non_scalar.iter().map(|key| (key, None)))
                .filter(|(key, _)| !declared.contains(key.as_str()))
                .collect();
            extras.sort_by(|a, b| a.0.cmp(b.0));
            for (key, value) in extras {
                violations.push(Violation::new(
                    key.clone(),
                    ViolationRule::ExtraField,
                    value.cloned(),
                ));
            }
        }

        ValidationOutcome::from_violations(violations)
    }
}

/// Evaluates every rule of one declared field.
fn check_field(spec: &FieldSpec, value: Option<&Value>, out: &mut Vec<Violation>) {
    let value = match value {
        None => {
            if !spec.nullable {
                out.push(Violation::new(&spec.name, ViolationRule::Missing, None));
            }
            return;
        }
        Some(v) => v,
    };

    match value {
        Value::Null => {
            if !spec.nullable {
                out.push(Violation::new(&spec.name, ViolationRule::Null, Some(Value::Null)));
            }
        }
        Value::Float(x) if !x.is_finite() => {
            if x.is_nan() && spec.nan_as_missing {
                if !spec.nullable {
                    out.push(Violation::new(&spec.name, ViolationRule::Null, Some(value.clone())));
                }
            } else {
                out.push(Violation::new(&spec.name, ViolationRule::NotFinite, Some(value.clone())));
            }
        }
        _ => check_type(spec, value, out),
    }
}

fn check_type(spec: &FieldSpec, value: &Value, out: &mut Vec<Violation>) {
    let type_ok = match (&spec.field_type, value) {
        (FieldType::Int { range }, Value::Int(i)) => {
            check_range(spec, range.as_ref(), *i as f64, value, out);
            true
        }
        (FieldType::Float { range }, Value::Int(_) | Value::Float(_)) => {
            if let Some(x) = value.as_f64() {
                check_range(spec, range.as_ref(), x, value, out);
            }
            true
        }
        (FieldType::String, Value::Str(_)) => true,
        (FieldType::Bool, Value::Bool(_)) => true,
        (FieldType::Categorical { allowed_values }, Value::Str(s)) => {
            if let Some(allowed) = allowed_values {
                if !allowed.contains(s) {
                    out.push(Violation::new(
                        &spec.name,
                        ViolationRule::AllowedValues,
                        Some(value.clone()),
                    ));
                }
            }
            true
        }
        (FieldType::Timestamp, Value::Int(_) | Value::Str(_)) => value.timestamp_seconds().is_some(),
        _ => false,
    };

    if !type_ok {
        out.push(Violation::new(&spec.name, ViolationRule::Type, Some(value.clone())));
    }
}

fn check_range(
    spec: &FieldSpec,
    range: Option<&NumericRange>,
    x: f64,
    value: &Value,
    out: &mut Vec<Violation>,
) {
    if let Some(range) = range {
        if !range.contains(x) {
            out.push(Violation::new(&spec.name, ViolationRule::Range, Some(value.clone())));
        }
    }
}

//! Validation outcomes: violations, per-record outcomes and batch partitions

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::{Record, Value};

/// Rule a record can violate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationRule {
    /// Record claims a different contract version
    SchemaVersion,
    /// Non-nullable field absent
    Missing,
    /// Non-nullable field explicitly null
    Null,
    /// Value variant does not match the declared type
    Type,
    /// NaN or infinite float
    NotFinite,
    /// Numeric value outside the closed range
    Range,
    /// Categorical value outside the allowed set
    AllowedValues,
    /// Undeclared field under the `reject` extra-field policy
    ExtraField,
}

impl ViolationRule {
    pub const ALL: [ViolationRule; 8] = [
        ViolationRule::SchemaVersion,
        ViolationRule::Missing,
        ViolationRule::Null,
        ViolationRule::Type,
        ViolationRule::NotFinite,
        ViolationRule::Range,
        ViolationRule::AllowedValues,
        ViolationRule::ExtraField,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationRule::SchemaVersion => "schema_version",
            ViolationRule::Missing => "missing",
            ViolationRule::Null => "null",
            ViolationRule::Type => "type",
            ViolationRule::NotFinite => "not_finite",
            ViolationRule::Range => "range",
            ViolationRule::AllowedValues => "allowed_values",
            ViolationRule::ExtraField => "extra_field",
        }
    }

    /// Dense index used by the counters.
    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ViolationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One broken rule on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub rule: ViolationRule,
    /// Offending value; `None` when the field was absent
    pub observed_value: Option<Value>,
}

impl Violation {
    pub fn new(field: impl Into<String>, rule: ViolationRule, observed_value: Option<Value>) -> Self {
        Self {
            field: field.into(),
            rule,
            observed_value,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.observed_value {
            Some(v) => write!(f, "field '{}': {} (observed {})", self.field, self.rule, v),
            None => write!(f, "field '{}': {} (absent)", self.field, self.rule),
        }
    }
}

/// Per-record outcome, produced once per record per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub accepted: bool,
    /// Every violated rule, in contract declaration order
    pub violations: Vec<Violation>,
}

impl ValidationOutcome {
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            accepted: violations.is_empty(),
            violations,
        }
    }

    pub fn has_rule(&self, rule: ViolationRule) -> bool {
        self.violations.iter().any(|v| v.rule == rule)
    }
}

/// A record diverted to quarantine together with its diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub record: Record,
    pub outcome: ValidationOutcome,
}

/// Result of validating a batch: a total partition of the input.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub accepted: Vec<Record>,
    pub rejected: Vec<RejectedRecord>,
}

impl ValidationReport {
    pub fn total(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }

    /// Accepted share of the batch; an empty batch yields 0.
    pub fn accepted_fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.accepted.len() as f64 / total as f64
        }
    }
}

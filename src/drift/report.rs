//! Drift verdicts and batch reports

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metric::DriftMetric;

/// Ordered: `None < Warning < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DriftSeverity {
    #[default]
    None,
    Warning,
    Critical,
}

impl DriftSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftSeverity::None => "none",
            DriftSeverity::Warning => "warning",
            DriftSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for DriftSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warning and critical cut-offs for one metric value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftThresholds {
    pub warning: f64,
    pub critical: f64,
}

impl DriftThresholds {
    pub fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }

    /// Both finite and `0 <= warning <= critical`.
    pub fn validate(&self) -> Result<(), String> {
        if !self.warning.is_finite() || !self.critical.is_finite() {
            return Err("thresholds must be finite".to_string());
        }
        if self.warning < 0.0 {
            return Err(format!("warning threshold {} is negative", self.warning));
        }
        if self.warning > self.critical {
            return Err(format!(
                "warning threshold {} exceeds critical threshold {}",
                self.warning, self.critical
            ));
        }
        Ok(())
    }

    /// `< warning` none, `[warning, critical)` warning, `>= critical` critical.
    pub fn classify(&self, value: f64) -> DriftSeverity {
        if value >= self.critical {
            DriftSeverity::Critical
        } else if value >= self.warning {
            DriftSeverity::Warning
        } else {
            DriftSeverity::None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerdictOutcome {
    Scored {
        metric: DriftMetric,
        metric_value: f64,
        thresholds: DriftThresholds,
        severity: DriftSeverity,
    },
    /// The batch has a statistic the baseline does not
    Unbaselined,
    Incomparable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftVerdict {
    pub field: String,
    #[serde(flatten)]
    pub outcome: VerdictOutcome,
}

impl DriftVerdict {
    pub fn scored(
        field: impl Into<String>,
        metric: DriftMetric,
        metric_value: f64,
        thresholds: DriftThresholds,
    ) -> Self {
        Self {
            field: field.into(),
            outcome: VerdictOutcome::Scored {
                metric,
                metric_value,
                thresholds,
                severity: thresholds.classify(metric_value),
            },
        }
    }

    pub fn unbaselined(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            outcome: VerdictOutcome::Unbaselined,
        }
    }

    pub fn incomparable(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            outcome: VerdictOutcome::Incomparable {
                reason: reason.into(),
            },
        }
    }

    /// Severity of a scored verdict; `None` for the other outcomes.
    pub fn severity(&self) -> Option<DriftSeverity> {
        match &self.outcome {
            VerdictOutcome::Scored { severity, .. } => Some(*severity),
            _ => None,
        }
    }
}

/// Drift verdicts for one batch, ordered by field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDriftReport {
    pub schema_version: String,
    pub verdicts: Vec<DriftVerdict>,
    /// Maximum severity over scored verdicts
    pub overall_severity: DriftSeverity,
    pub generated_at: DateTime<Utc>,
}

impl BatchDriftReport {
    pub fn new(
        schema_version: impl Into<String>,
        verdicts: Vec<DriftVerdict>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let overall_severity = verdicts
            .iter()
            .filter_map(DriftVerdict::severity)
            .max()
            .unwrap_or_default();
        Self {
            schema_version: schema_version.into(),
            verdicts,
            overall_severity,
            generated_at,
        }
    }

    pub fn verdict(&self, field: &str) -> Option<&DriftVerdict> {
        self.verdicts.iter().find(|v| v.field == field)
    }

    /// Fields scored at warning or above.
    pub fn flagged(&self) -> impl Iterator<Item = &DriftVerdict> {
        self.verdicts
            .iter()
            .filter(|v| v.severity().map_or(false, |s| s > DriftSeverity::None))
    }
}

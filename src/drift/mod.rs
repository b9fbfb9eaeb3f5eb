//! Drift monitoring
//!
//! Per-field divergence between a batch and its baseline, mapped onto
//! `none / warning / critical` through thresholds.

mod metric;
mod monitor;
mod report;

pub use metric::{DriftMetric, EPSILON};
pub use monitor::{DriftMonitor, ThresholdOverrides};
pub use report::{BatchDriftReport, DriftSeverity, DriftThresholds, DriftVerdict, VerdictOutcome};

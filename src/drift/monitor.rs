//! Drift monitor
//!
//! Compares a batch's statistics against a baseline snapshot, field by
//! field. The monitor only reports; acting on severity is the caller's
//! decision.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use rayon::prelude::*;

use super::metric::DriftMetric;
use super::report::{BatchDriftReport, DriftThresholds, DriftVerdict};
use crate::baseline::Baseline;
use crate::stats::{BatchStatistics, FieldStatistic};

/// Per-field threshold overrides; unlisted fields use the metric defaults.
pub type ThresholdOverrides = BTreeMap<String, DriftThresholds>;

#[derive(Debug, Clone, Default)]
pub struct DriftMonitor {
    metrics: BTreeMap<String, DriftMetric>,
}

impl DriftMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monitor with per-field metric overrides.
    pub fn with_metrics(metrics: BTreeMap<String, DriftMetric>) -> Self {
        Self { metrics }
    }

    pub fn set_metric(&mut self, field: impl Into<String>, metric: DriftMetric) {
        self.metrics.insert(field.into(), metric);
    }

    /// Metric applied to `field` given the baseline's statistic kind.
    pub fn metric_for(&self, field: &str, baseline: &FieldStatistic) -> DriftMetric {
        self.metrics
            .get(field)
            .copied()
            .unwrap_or_else(|| DriftMetric::default_for(baseline))
    }

    /// Scores every field present in the batch or the baseline.
    ///
    /// Verdicts come back ordered by field name.
    pub fn check(
        &self,
        batch_stats: &BatchStatistics,
        baseline: &Baseline,
        thresholds: &ThresholdOverrides,
    ) -> BatchDriftReport {
        let fields: Vec<&String> = batch_stats
            .keys()
            .chain(baseline.fields.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let verdicts: Vec<DriftVerdict> = fields
            .par_iter()
            .map(|field| {
                self.score_field(
                    field,
                    baseline.fields.get(*field),
                    batch_stats.get(*field),
                    thresholds,
                )
            })
            .collect();

        BatchDriftReport::new(baseline.schema_version.clone(), verdicts, Utc::now())
    }

    fn score_field(
        &self,
        field: &str,
        baseline: Option<&FieldStatistic>,
        batch: Option<&FieldStatistic>,
        thresholds: &ThresholdOverrides,
    ) -> DriftVerdict {
        let (base, current) = match (baseline, batch) {
            (None, _) => return DriftVerdict::unbaselined(field),
            (Some(_), None) => return DriftVerdict::incomparable(field, "field absent from batch"),
            (Some(base), Some(current)) => (base, current),
        };

        if current.count() == 0 {
            return DriftVerdict::incomparable(field, "batch column has no non-null values");
        }
        if base.count() == 0 {
            return DriftVerdict::incomparable(field, "baseline column has no non-null values");
        }

        let metric = self.metric_for(field, base);
        match metric.compute(base, current) {
            Ok(value) => {
                let t = thresholds
                    .get(field)
                    .copied()
                    .unwrap_or_else(|| metric.default_thresholds());
                DriftVerdict::scored(field, metric, value, t)
            }
            Err(reason) => DriftVerdict::incomparable(field, reason),
        }
    }
}

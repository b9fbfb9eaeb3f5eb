//! Drift metric strategies
//!
//! Every metric maps a (baseline, batch) statistic pair to a non-negative
//! divergence that is exactly 0 for identical statistics.
//!
//! Numeric metrics read the quantile sketches as piecewise-linear CDFs.
//! PSI and KL bin on the baseline's interior quantile points, so each bin
//! holds roughly a tenth of the baseline mass.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::report::DriftThresholds;
use crate::stats::{CategoricalSummary, FieldStatistic, NumericSummary, QuantileSketch};

/// Probability floor for empty bins and unseen categories.
pub const EPSILON: f64 = 1e-5;

/// Lower bound on the baseline standard deviation in `mean_shift`.
const MIN_STD_DEV: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftMetric {
    /// |mean_batch - mean_baseline| / sd_baseline
    MeanShift,
    /// Population stability index
    Psi,
    /// KL(batch || baseline)
    KlDivergence,
    /// Kolmogorov-Smirnov distance between sketch CDFs
    Ks,
    /// Pearson divergence on category proportions
    ChiSquare,
    /// Cramer's V of the baseline-vs-batch contingency table, in [0, 1]
    CramersV,
}

impl DriftMetric {
    pub const ALL: [DriftMetric; 6] = [
        DriftMetric::MeanShift,
        DriftMetric::Psi,
        DriftMetric::KlDivergence,
        DriftMetric::Ks,
        DriftMetric::ChiSquare,
        DriftMetric::CramersV,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DriftMetric::MeanShift => "mean_shift",
            DriftMetric::Psi => "psi",
            DriftMetric::KlDivergence => "kl_divergence",
            DriftMetric::Ks => "ks",
            DriftMetric::ChiSquare => "chi_square",
            DriftMetric::CramersV => "cramers_v",
        }
    }

    /// Metric used when no per-field override is configured.
    pub fn default_for(stat: &FieldStatistic) -> Self {
        match stat {
            FieldStatistic::Numeric(_) => DriftMetric::MeanShift,
            FieldStatistic::Categorical(_) => DriftMetric::Psi,
        }
    }

    pub fn default_thresholds(&self) -> DriftThresholds {
        match self {
            DriftMetric::MeanShift => DriftThresholds::new(1.0, 3.0),
            DriftMetric::Psi => DriftThresholds::new(0.1, 0.25),
            DriftMetric::KlDivergence => DriftThresholds::new(0.1, 0.5),
            DriftMetric::Ks => DriftThresholds::new(0.1, 0.2),
            DriftMetric::ChiSquare => DriftThresholds::new(0.1, 0.5),
            DriftMetric::CramersV => DriftThresholds::new(0.1, 0.3),
        }
    }

    pub fn supports(&self, stat: &FieldStatistic) -> bool {
        match (self, stat) {
            (DriftMetric::Psi | DriftMetric::KlDivergence, _) => true,
            (DriftMetric::MeanShift | DriftMetric::Ks, FieldStatistic::Numeric(_)) => true,
            (DriftMetric::ChiSquare | DriftMetric::CramersV, FieldStatistic::Categorical(_)) => true,
            _ => false,
        }
    }

    /// Computes the divergence of `batch` from `baseline`.
    ///
    /// Returns `Err(reason)` when the pair cannot be scored with this metric.
    pub fn compute(&self, baseline: &FieldStatistic, batch: &FieldStatistic) -> Result<f64, String> {
        if !self.supports(baseline) {
            return Err(format!(
                "metric {} does not apply to {} statistics",
                self,
                baseline.kind_name()
            ));
        }

        let value = match (baseline, batch) {
            (FieldStatistic::Numeric(base), FieldStatistic::Numeric(cur)) => match self {
                DriftMetric::MeanShift => mean_shift(base, cur),
                DriftMetric::Psi => {
                    let (expected, actual) = numeric_bins(&base.quantiles, &cur.quantiles);
                    psi(&expected, &actual)
                }
                DriftMetric::KlDivergence => {
                    let (expected, actual) = numeric_bins(&base.quantiles, &cur.quantiles);
                    kl_divergence(&expected, &actual)
                }
                DriftMetric::Ks => ks_distance(&base.quantiles, &cur.quantiles),
                DriftMetric::ChiSquare | DriftMetric::CramersV => unreachable_pair(),
            },
            (FieldStatistic::Categorical(base), FieldStatistic::Categorical(cur)) => {
                if *self == DriftMetric::CramersV {
                    cramers_v(base, cur)
                } else {
                    let (expected, actual) = category_proportions(base, cur);
                    match self {
                        DriftMetric::Psi => psi(&expected, &actual),
                        DriftMetric::KlDivergence => kl_divergence(&expected, &actual),
                        DriftMetric::ChiSquare => chi_square(&expected, &actual),
                        _ => unreachable_pair(),
                    }
                }
            }
            _ => {
                return Err(format!(
                    "statistic kind mismatch: baseline {}, batch {}",
                    baseline.kind_name(),
                    batch.kind_name()
                ))
            }
        };

        if value.is_finite() {
            Ok(value)
        } else {
            Err(format!("metric {} is not finite", self))
        }
    }
}

impl fmt::Display for DriftMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Excluded by `supports`; scores as no drift rather than panicking.
fn unreachable_pair() -> f64 {
    0.0
}

fn mean_shift(base: &NumericSummary, cur: &NumericSummary) -> f64 {
    let delta = (cur.mean - base.mean).abs();
    if delta == 0.0 {
        return 0.0;
    }
    delta / base.std_dev().max(MIN_STD_DEV)
}

/// Bin probabilities (baseline, batch) over the baseline's interior points.
fn numeric_bins(base: &QuantileSketch, cur: &QuantileSketch) -> (Vec<f64>, Vec<f64>) {
    let n = base.points.len();
    let mut edges: Vec<f64> = if n > 2 {
        base.points[1..n - 1].to_vec()
    } else {
        base.points.clone()
    };
    edges.dedup();

    let masses = |sketch: &QuantileSketch| {
        let mut out = Vec::with_capacity(edges.len() + 1);
        let mut prev = 0.0;
        for edge in &edges {
            let c = sketch.cdf(*edge);
            out.push(c - prev);
            prev = c;
        }
        out.push(1.0 - prev);
        smooth(out)
    };

    (masses(base), masses(cur))
}

/// Proportions (baseline, batch) over the union of categories.
fn category_proportions(base: &CategoricalSummary, cur: &CategoricalSummary) -> (Vec<f64>, Vec<f64>) {
    let categories: BTreeSet<&String> = base
        .frequencies
        .keys()
        .chain(cur.frequencies.keys())
        .collect();

    let expected = categories.iter().map(|c| base.proportion(c)).collect();
    let actual = categories.iter().map(|c| cur.proportion(c)).collect();
    (smooth(expected), smooth(actual))
}

/// Floors every probability at `EPSILON` and renormalizes.
fn smooth(mut probs: Vec<f64>) -> Vec<f64> {
    for p in probs.iter_mut() {
        *p = p.max(EPSILON);
    }
    let total: f64 = probs.iter().sum();
    if total > 0.0 {
        for p in probs.iter_mut() {
            *p /= total;
        }
    }
    probs
}

fn psi(expected: &[f64], actual: &[f64]) -> f64 {
    expected
        .iter()
        .zip(actual)
        .map(|(e, a)| if a == e { 0.0 } else { (a - e) * (a / e).ln() })
        .sum()
}

fn kl_divergence(expected: &[f64], actual: &[f64]) -> f64 {
    let kl: f64 = expected
        .iter()
        .zip(actual)
        .map(|(e, a)| if a == e { 0.0 } else { a * (a / e).ln() })
        .sum();
    // Rounding can leave a tiny negative for near-identical inputs
    kl.max(0.0)
}

fn chi_square(expected: &[f64], actual: &[f64]) -> f64 {
    expected
        .iter()
        .zip(actual)
        .map(|(e, a)| (a - e) * (a - e) / e)
        .sum()
}

/// Cramer's V over the 2 x k table of raw counts (baseline row, batch row).
///
/// Unlike `chi_square` this works on counts, so it needs no smoothing; with
/// two rows it reduces to `sqrt(chi2 / n)`. A single category in the union
/// has no association to measure and scores 0.
fn cramers_v(base: &CategoricalSummary, cur: &CategoricalSummary) -> f64 {
    let categories: BTreeSet<&String> = base
        .frequencies
        .keys()
        .chain(cur.frequencies.keys())
        .collect();
    let rows = [base, cur];
    let row_totals = [base.count as f64, cur.count as f64];
    let n = row_totals[0] + row_totals[1];
    if categories.len() < 2 || n == 0.0 {
        return 0.0;
    }

    let mut chi2 = 0.0;
    for category in &categories {
        let observed: Vec<f64> = rows
            .iter()
            .map(|r| r.frequencies.get(*category).copied().unwrap_or(0) as f64)
            .collect();
        let column_total: f64 = observed.iter().sum();
        for (o, row_total) in observed.iter().zip(row_totals) {
            let e = row_total * column_total / n;
            if e > 0.0 {
                chi2 += (o - e) * (o - e) / e;
            }
        }
    }
    (chi2 / n).sqrt().min(1.0)
}

fn ks_distance(base: &QuantileSketch, cur: &QuantileSketch) -> f64 {
    base.points
        .iter()
        .chain(cur.points.iter())
        .map(|x| (base.cdf(*x) - cur.cdf(*x)).abs())
        .fold(0.0, f64::max)
}

//! Per-field summaries of one batch

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::sketch::QuantileSketch;

/// Moments, extremes and quantile sketch of a numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    /// Non-null, finite observations
    pub count: u64,
    pub null_count: u64,
    pub mean: f64,
    /// Sample variance (n - 1 denominator); 0 below two observations
    pub variance: f64,
    pub min: f64,
    pub max: f64,
    pub quantiles: QuantileSketch,
}

impl NumericSummary {
    /// Summarizes the given observations. Nulls are counted by the caller.
    pub fn from_values(mut values: Vec<f64>, null_count: u64) -> Self {
        if values.is_empty() {
            return Self {
                count: 0,
                null_count,
                mean: 0.0,
                variance: 0.0,
                min: 0.0,
                max: 0.0,
                quantiles: QuantileSketch::empty(),
            };
        }

        // Welford's online update keeps the variance stable for large means
        let mut mean = 0.0;
        let mut m2 = 0.0;
        for (i, x) in values.iter().enumerate() {
            let delta = x - mean;
            mean += delta / (i + 1) as f64;
            m2 += delta * (x - mean);
        }
        let n = values.len();
        let variance = if n > 1 { m2 / (n - 1) as f64 } else { 0.0 };

        values.sort_by(|a, b| a.total_cmp(b));

        Self {
            count: n as u64,
            null_count,
            mean,
            variance,
            min: values[0],
            max: values[n - 1],
            quantiles: QuantileSketch::from_sorted(&values),
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }

    /// False when the moments or sketch overflowed, e.g. squared deviations
    /// of values near `f64::MAX`. JSON cannot carry such a summary.
    pub fn is_finite(&self) -> bool {
        [self.mean, self.variance, self.min, self.max]
            .iter()
            .chain(self.quantiles.points.iter())
            .all(|x| x.is_finite())
    }
}

/// Frequency table of a categorical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalSummary {
    pub count: u64,
    pub null_count: u64,
    pub frequencies: BTreeMap<String, u64>,
}

impl CategoricalSummary {
    pub fn from_values<I>(values: I, null_count: u64) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut frequencies = BTreeMap::new();
        let mut count = 0;
        for v in values {
            *frequencies.entry(v).or_insert(0u64) += 1;
            count += 1;
        }
        Self {
            count,
            null_count,
            frequencies,
        }
    }

    /// Share of the non-null observations taken by `category`.
    pub fn proportion(&self, category: &str) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.frequencies.get(category).copied().unwrap_or(0) as f64 / self.count as f64
    }
}

/// Summary of one field over one batch. Computed fresh per batch and never
/// merged into a baseline in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldStatistic {
    Numeric(NumericSummary),
    Categorical(CategoricalSummary),
}

impl FieldStatistic {
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldStatistic::Numeric(_) => "numeric",
            FieldStatistic::Categorical(_) => "categorical",
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            FieldStatistic::Numeric(s) => s.is_finite(),
            FieldStatistic::Categorical(_) => true,
        }
    }

    /// Non-null observation count.
    pub fn count(&self) -> u64 {
        match self {
            FieldStatistic::Numeric(s) => s.count,
            FieldStatistic::Categorical(s) => s.count,
        }
    }
}

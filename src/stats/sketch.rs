//! Fixed-resolution quantile sketch
//!
//! Stores the 0%, 10%, ..., 100% quantiles of a column (linear interpolation
//! between order statistics). Drift metrics read the sketch as a piecewise
//! linear CDF.

use serde::{Deserialize, Serialize};

/// Number of stored quantile points (deciles plus both extremes).
pub const SKETCH_POINTS: usize = 11;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileSketch {
    /// Non-decreasing quantile values; empty for an empty column
    pub points: Vec<f64>,
}

impl QuantileSketch {
    pub fn empty() -> Self {
        Self { points: Vec::new() }
    }

    /// Builds the sketch from ascending-sorted finite values.
    pub fn from_sorted(sorted: &[f64]) -> Self {
        if sorted.is_empty() {
            return Self::empty();
        }
        let last = (sorted.len() - 1) as f64;
        let points = (0..SKETCH_POINTS)
            .map(|k| {
                let pos = last * k as f64 / (SKETCH_POINTS - 1) as f64;
                let lo = pos.floor() as usize;
                let hi = pos.ceil() as usize;
                sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
            })
            .collect();
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Estimated fraction of the column that is `<= x`.
    ///
    /// Monotone non-decreasing in `x`; 0 below the minimum and 1 at or above
    /// the maximum. Runs of equal points become a jump.
    pub fn cdf(&self, x: f64) -> f64 {
        let n = self.points.len();
        if n == 0 {
            return 0.0;
        }
        if x < self.points[0] {
            return 0.0;
        }
        if x >= self.points[n - 1] {
            return 1.0;
        }
        // Largest i with points[i] <= x; points[i + 1] > x is guaranteed
        let i = self.points.partition_point(|p| *p <= x) - 1;
        let (lo, hi) = (self.points[i], self.points[i + 1]);
        let frac = (x - lo) / (hi - lo);
        (i as f64 + frac) / (n - 1) as f64
    }
}

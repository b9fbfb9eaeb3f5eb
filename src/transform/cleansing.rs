//! Record cleansing
//!
//! Runs in a fixed order: duplicates, nulls, negatives, outliers. Each rule
//! only removes records; surviving records keep their input order.

use std::collections::HashSet;

use super::config::CleansingConfig;
use super::errors::TransformResult;
use super::Transformer;
use crate::record::{Record, Value};

#[derive(Debug, Clone)]
pub struct Cleansing {
    config: CleansingConfig,
}

impl Cleansing {
    pub fn new(config: CleansingConfig) -> Self {
        Self { config }
    }

    fn drop_duplicates(records: Vec<Record>) -> Vec<Record> {
        let mut seen = HashSet::new();
        records
            .into_iter()
            .filter(|r| {
                // Field maps are ordered, so equal records serialize equally
                let key = serde_json::to_string(r).unwrap_or_default();
                seen.insert(key)
            })
            .collect()
    }

    fn is_missing(value: Option<&Value>) -> bool {
        match value {
            None | Some(Value::Null) => true,
            Some(Value::Float(f)) => f.is_nan(),
            Some(_) => false,
        }
    }

    /// Population mean and standard deviation of the finite values.
    fn moments(records: &[Record], field: &str) -> Option<(f64, f64)> {
        let values: Vec<f64> = records
            .iter()
            .filter_map(|r| r.get(field).and_then(Value::as_f64))
            .filter(|x| x.is_finite())
            .collect();
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
        Some((mean, variance.sqrt()))
    }
}

impl Transformer for Cleansing {
    fn name(&self) -> &str {
        "cleansing"
    }

    fn apply(&self, mut records: Vec<Record>) -> TransformResult<Vec<Record>> {
        if self.config.drop_duplicates {
            records = Self::drop_duplicates(records);
        }

        if !self.config.drop_null_fields.is_empty() {
            records.retain(|r| {
                !self
                    .config
                    .drop_null_fields
                    .iter()
                    .any(|f| Self::is_missing(r.get(f)))
            });
        }

        if !self.config.non_negative_fields.is_empty() {
            records.retain(|r| {
                !self
                    .config
                    .non_negative_fields
                    .iter()
                    .any(|f| r.get(f).and_then(Value::as_f64).map_or(false, |x| x < 0.0))
            });
        }

        if !self.config.outlier_fields.is_empty() {
            let bounds: Vec<(&str, f64, f64)> = self
                .config
                .outlier_fields
                .iter()
                .filter_map(|f| {
                    Self::moments(&records, f)
                        .filter(|(_, sd)| *sd > 0.0)
                        .map(|(mean, sd)| (f.as_str(), mean, sd))
                })
                .collect();
            let threshold = self.config.z_threshold;
            records.retain(|r| {
                !bounds.iter().any(|(field, mean, sd)| {
                    r.get(field)
                        .and_then(Value::as_f64)
                        .map_or(false, |x| ((x - mean) / sd).abs() > threshold)
                })
            });
        }

        Ok(records)
    }
}

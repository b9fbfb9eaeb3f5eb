//! Trailing-window features
//!
//! Records are grouped by their key fields and ordered by time. Each record
//! gets one column per aggregation, computed over the records of its group
//! with time in `(t - window, t]`, itself included. Output keeps input order.

use std::collections::HashMap;

use super::config::{Aggregation, AggregationOp, RollingFeaturesConfig};
use super::errors::{TransformError, TransformResult};
use super::Transformer;
use crate::record::{Record, Value};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone)]
pub struct RollingFeatures {
    config: RollingFeaturesConfig,
}

impl RollingFeatures {
    pub fn new(config: RollingFeaturesConfig) -> Self {
        Self { config }
    }

    fn window_seconds(&self) -> i64 {
        i64::from(self.config.window_days) * SECONDS_PER_DAY
    }

    fn group_key(&self, record: &Record) -> String {
        let parts: Vec<String> = self
            .config
            .key_fields
            .iter()
            .map(|f| match record.get(f) {
                Some(v) => serde_json::to_string(v).unwrap_or_default(),
                None => "null".to_string(),
            })
            .collect();
        parts.join("\u{1f}")
    }

    fn timestamp(&self, record: &Record) -> TransformResult<i64> {
        let field = &self.config.time_field;
        record
            .get(field)
            .and_then(Value::timestamp_seconds)
            .ok_or_else(|| TransformError::InvalidTimestamp {
                step: self.name().to_string(),
                field: field.clone(),
                value: record
                    .get(field)
                    .map_or_else(|| "<missing>".to_string(), |v| v.to_string()),
            })
    }

    /// Contribution of one record to one aggregation.
    fn contribution(&self, agg: &Aggregation, record: &Record) -> TransformResult<f64> {
        if let Some(cond) = &agg.when {
            if !cond.matches(record.get(&cond.field)) {
                return Ok(0.0);
            }
        }
        match &agg.op {
            AggregationOp::Count => Ok(1.0),
            AggregationOp::Sum { field } => match record.get(field) {
                None | Some(Value::Null) => Ok(0.0),
                Some(v) => match v.as_f64() {
                    Some(x) if x.is_nan() => Ok(0.0),
                    Some(x) => Ok(x),
                    None => Err(TransformError::NotNumeric {
                        step: self.name().to_string(),
                        field: field.clone(),
                        value: v.to_string(),
                    }),
                },
            },
        }
    }
}

impl Transformer for RollingFeatures {
    fn name(&self) -> &str {
        "rolling_features"
    }

    fn apply(&self, records: Vec<Record>) -> TransformResult<Vec<Record>> {
        let n = records.len();
        let aggs = &self.config.aggregations;

        let mut times = Vec::with_capacity(n);
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            times.push(self.timestamp(record)?);
            groups.entry(self.group_key(record)).or_default().push(i);
        }

        // contributions[i][k]: record i's share of aggregation k
        let mut contributions = Vec::with_capacity(n);
        for record in &records {
            let row = aggs
                .iter()
                .map(|agg| self.contribution(agg, record))
                .collect::<TransformResult<Vec<f64>>>()?;
            contributions.push(row);
        }

        let window = self.window_seconds();
        let mut features = vec![vec![0.0; aggs.len()]; n];
        for members in groups.values_mut() {
            members.sort_by_key(|&i| (times[i], i));

            // Prefix sums over the time-ordered group
            let mut prefix = vec![vec![0.0; aggs.len()]; members.len() + 1];
            for (pos, &i) in members.iter().enumerate() {
                for k in 0..aggs.len() {
                    prefix[pos + 1][k] = prefix[pos][k] + contributions[i][k];
                }
            }

            let mut lo = 0;
            let mut hi = 0;
            for &i in members.iter() {
                let t = times[i];
                while hi < members.len() && times[members[hi]] <= t {
                    hi += 1;
                }
                // No cutoff when t - window falls below i64::MIN
                let cutoff = t.checked_sub(window);
                while lo < hi && matches!(cutoff, Some(c) if times[members[lo]] <= c) {
                    lo += 1;
                }
                for k in 0..aggs.len() {
                    features[i][k] = prefix[hi][k] - prefix[lo][k];
                }
            }
        }

        Ok(records
            .into_iter()
            .zip(features)
            .map(|(record, row)| {
                aggs.iter().zip(row).fold(record, |record, (agg, x)| {
                    let value = match agg.op {
                        AggregationOp::Count => Value::Int(x.round() as i64),
                        AggregationOp::Sum { .. } => Value::Float(x),
                    };
                    record.with(agg.name.clone(), value)
                })
            })
            .collect())
    }
}

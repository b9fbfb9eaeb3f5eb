//! Batch statistic computation
//!
//! One statistic per contract field that has a distribution worth tracking:
//! - int, float, timestamp: numeric summary (timestamps as Unix seconds)
//! - categorical, bool: frequency table
//! - string: none (free text, typically identifiers)
//!
//! Fields are independent, so they are summarized in parallel.

use std::collections::BTreeMap;

use rayon::prelude::*;

use super::summary::{CategoricalSummary, FieldStatistic, NumericSummary};
use crate::contract::{Contract, FieldSpec, FieldType};
use crate::record::{Record, Value};

/// Field name to statistic, for one batch.
pub type BatchStatistics = BTreeMap<String, FieldStatistic>;

/// Summarizes every tracked field of the contract over the given records.
///
/// Intended for accepted records; values that do not fit the field type
/// are counted as nulls rather than failing.
pub fn compute_batch_statistics(records: &[Record], contract: &Contract) -> BatchStatistics {
    contract
        .fields
        .par_iter()
        .filter_map(|spec| summarize_field(records, spec).map(|stat| (spec.name.clone(), stat)))
        .collect()
}

/// Summarizes a single field, or `None` for untracked types.
pub fn summarize_field(records: &[Record], spec: &FieldSpec) -> Option<FieldStatistic> {
    if spec.field_type.is_numeric() {
        let mut values = Vec::with_capacity(records.len());
        let mut nulls = 0u64;
        for record in records {
            match record.get(&spec.name).and_then(|v| numeric_value(&spec.field_type, v)) {
                Some(x) => values.push(x),
                None => nulls += 1,
            }
        }
        Some(FieldStatistic::Numeric(NumericSummary::from_values(values, nulls)))
    } else if spec.field_type.is_categorical() {
        let mut nulls = 0u64;
        let mut values = Vec::with_capacity(records.len());
        for record in records {
            match record.get(&spec.name).and_then(category_label) {
                Some(label) => values.push(label),
                None => nulls += 1,
            }
        }
        Some(FieldStatistic::Categorical(CategoricalSummary::from_values(values, nulls)))
    } else {
        None
    }
}

fn numeric_value(field_type: &FieldType, value: &Value) -> Option<f64> {
    let x = match field_type {
        FieldType::Timestamp => value.timestamp_seconds().map(|s| s as f64),
        _ => value.as_f64(),
    }?;
    x.is_finite().then_some(x)
}

fn category_label(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

//! Declarative transform configuration
//!
//! ```json
//! {
//!   "cleansing": { "drop_duplicates": true, "outlier_fields": ["amount"] },
//!   "features": {
//!     "key_fields": ["user_id", "value_prop"],
//!     "time_field": "day",
//!     "window_days": 21,
//!     "aggregations": [
//!       { "name": "clicked_21d", "op": "count", "when": { "field": "event", "equals": "tap" } },
//!       { "name": "pay_amount_21d", "op": "sum", "field": "amount" }
//!     ]
//!   }
//! }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::errors::{TransformError, TransformResult};
use crate::record::Value;

fn default_z_threshold() -> f64 {
    3.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub cleansing: Option<CleansingConfig>,
    #[serde(default)]
    pub features: Option<RollingFeaturesConfig>,
}

impl TransformConfig {
    pub fn validate(&self) -> TransformResult<()> {
        if let Some(cleansing) = &self.cleansing {
            cleansing.validate()?;
        }
        if let Some(features) = &self.features {
            features.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleansingConfig {
    /// Drop exact duplicate records, keeping the first
    #[serde(default)]
    pub drop_duplicates: bool,
    /// Drop records with a missing, null or NaN value in any of these
    #[serde(default)]
    pub drop_null_fields: Vec<String>,
    /// Drop records with a negative value in any of these
    #[serde(default)]
    pub non_negative_fields: Vec<String>,
    /// Drop records whose z-score exceeds `z_threshold` in any of these
    #[serde(default)]
    pub outlier_fields: Vec<String>,
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,
}

impl Default for CleansingConfig {
    fn default() -> Self {
        Self {
            drop_duplicates: false,
            drop_null_fields: Vec::new(),
            non_negative_fields: Vec::new(),
            outlier_fields: Vec::new(),
            z_threshold: default_z_threshold(),
        }
    }
}

impl CleansingConfig {
    pub fn validate(&self) -> TransformResult<()> {
        if !(self.z_threshold.is_finite() && self.z_threshold > 0.0) {
            return Err(TransformError::InvalidConfig(format!(
                "z_threshold must be a positive number, got {}",
                self.z_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingFeaturesConfig {
    pub key_fields: Vec<String>,
    pub time_field: String,
    pub window_days: u32,
    pub aggregations: Vec<Aggregation>,
}

impl RollingFeaturesConfig {
    pub fn validate(&self) -> TransformResult<()> {
        if self.window_days == 0 {
            return Err(TransformError::InvalidConfig(
                "window_days must be at least 1".to_string(),
            ));
        }
        if self.aggregations.is_empty() {
            return Err(TransformError::InvalidConfig(
                "rolling features need at least one aggregation".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for agg in &self.aggregations {
            if agg.name.is_empty() {
                return Err(TransformError::InvalidConfig(
                    "aggregation name must not be empty".to_string(),
                ));
            }
            if agg.name == self.time_field || self.key_fields.contains(&agg.name) {
                return Err(TransformError::InvalidConfig(format!(
                    "aggregation '{}' would overwrite a key or time field",
                    agg.name
                )));
            }
            if !names.insert(agg.name.as_str()) {
                return Err(TransformError::InvalidConfig(format!(
                    "duplicate aggregation name '{}'",
                    agg.name
                )));
            }
        }
        Ok(())
    }
}

/// One output column computed over the trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub name: String,
    #[serde(flatten)]
    pub op: AggregationOp,
    #[serde(default)]
    pub when: Option<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AggregationOp {
    Count,
    Sum { field: String },
}

/// Restricts an aggregation to records where `field == equals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub equals: Value,
}

impl Condition {
    /// Numbers compare by value, so `1` matches `1.0`.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match (value, &self.equals) {
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                value.as_f64() == self.equals.as_f64()
            }
            _ => *value == self.equals,
        }
    }
}

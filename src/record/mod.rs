//! Record model for ingested interaction events
//!
//! A record is a flat mapping from field name to a scalar [`Value`], tagged
//! with the contract version it claims to conform to. Records are produced by
//! ingestion, classified by the validator and never mutated afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

/// Closed set of scalar values a record field may carry.
///
/// Serialized untagged so records read and write as plain JSON scalars.
/// Floats may be non-finite when produced programmatically; JSON cannot carry
/// them, so they serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    Str(String),
}

impl Value {
    /// Returns the variant name used in violation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Interprets the value as a point in time, in Unix seconds.
    ///
    /// Accepts RFC 3339 strings, `YYYY-MM-DD` dates (midnight UTC) and
    /// integer Unix seconds.
    pub fn timestamp_seconds(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Str(s) => parse_timestamp(s),
            _ => None,
        }
    }

    /// Converts a JSON value into a record scalar.
    ///
    /// Arrays and objects have no scalar form and are rejected.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int(i))
                } else {
                    n.as_f64().map(Value::Float)
                }
            }
            serde_json::Value::String(s) => Some(Value::Str(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// Parses an RFC 3339 timestamp or a plain `YYYY-MM-DD` date into Unix
/// seconds.
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.timestamp());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

/// One ingested record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Contract version this record claims to conform to
    pub schema_version: String,
    /// Field values keyed by field name
    pub values: BTreeMap<String, Value>,
    /// Fields present in the input whose value was an array or object.
    /// They have no scalar form, so they are kept out of `values` and
    /// reported by the validator instead.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub non_scalar: BTreeSet<String>,
}

impl Record {
    /// Creates an empty record bound to a contract version.
    pub fn new(schema_version: impl Into<String>) -> Self {
        Self {
            schema_version: schema_version.into(),
            values: BTreeMap::new(),
            non_scalar: BTreeSet::new(),
        }
    }

    /// Builder-style field setter, used heavily by fixtures.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Marks a field as carrying an array or object value.
    pub fn with_non_scalar(mut self, field: impl Into<String>) -> Self {
        self.non_scalar.insert(field.into());
        self
    }

    /// Builds a record from a JSON object.
    ///
    /// Nested objects are flattened with dotted keys (`a.b`) when `flatten`
    /// is set. Arrays, and nested objects when not flattening, land in
    /// `non_scalar` so one malformed row is quarantined rather than failing
    /// the batch.
    pub fn from_json_object(
        schema_version: &str,
        object: &serde_json::Map<String, serde_json::Value>,
        flatten: bool,
    ) -> Self {
        let mut record = Record::new(schema_version);
        record.collect_fields("", object, flatten);
        record
    }

    fn collect_fields(
        &mut self,
        prefix: &str,
        object: &serde_json::Map<String, serde_json::Value>,
        flatten: bool,
    ) {
        for (key, raw) in object {
            let name = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            match raw {
                serde_json::Value::Object(nested) if flatten => {
                    self.collect_fields(&name, nested, flatten);
                }
                other => match Value::from_json(other) {
                    Some(value) => {
                        self.values.insert(name, value);
                    }
                    None => {
                        self.non_scalar.insert(name);
                    }
                },
            }
        }
    }
}

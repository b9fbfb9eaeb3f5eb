//! Contract type definitions
//!
//! Supported field types:
//! - int: 64-bit signed integer, optional closed range
//! - float: 64-bit float, optional closed range (integers accepted)
//! - string: free UTF-8 text
//! - bool: boolean
//! - categorical: string drawn from an optional allowed set
//! - timestamp: RFC 3339 string, `YYYY-MM-DD` date or integer Unix seconds

use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Closed numeric interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
}

impl NumericRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, x: f64) -> bool {
        x >= self.min && x <= self.max
    }
}

/// Field type as a closed tagged variant; each variant carries only the
/// constraints that make sense for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    Int {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        range: Option<NumericRange>,
    },
    Float {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        range: Option<NumericRange>,
    },
    String,
    Bool,
    Categorical {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        allowed_values: Option<BTreeSet<String>>,
    },
    Timestamp,
}

impl FieldType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Int { .. } => "int",
            FieldType::Float { .. } => "float",
            FieldType::String => "string",
            FieldType::Bool => "bool",
            FieldType::Categorical { .. } => "categorical",
            FieldType::Timestamp => "timestamp",
        }
    }

    /// Whether batch statistics for this type are moments + quantiles.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Int { .. } | FieldType::Float { .. } | FieldType::Timestamp
        )
    }

    /// Whether batch statistics for this type are a frequency table.
    pub fn is_categorical(&self) -> bool {
        matches!(self, FieldType::Categorical { .. } | FieldType::Bool)
    }
}

/// One declared field of a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub field_type: FieldType,
    /// Absent keys and explicit nulls are allowed
    #[serde(default)]
    pub nullable: bool,
    /// Treat NaN as a missing value instead of an invalid one
    #[serde(default)]
    pub nan_as_missing: bool,
}

impl FieldSpec {
    fn of(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            nan_as_missing: false,
        }
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::of(name, FieldType::Int { range: None })
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::of(name, FieldType::Float { range: None })
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::of(name, FieldType::String)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::of(name, FieldType::Bool)
    }

    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::of(name, FieldType::Timestamp)
    }

    /// Categorical field restricted to the given values.
    pub fn categorical<I, S>(name: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::of(
            name,
            FieldType::Categorical {
                allowed_values: Some(allowed.into_iter().map(Into::into).collect()),
            },
        )
    }

    /// Categorical field with an open value set.
    pub fn open_categorical(name: impl Into<String>) -> Self {
        Self::of(
            name,
            FieldType::Categorical {
                allowed_values: None,
            },
        )
    }

    /// Attaches a closed range to an int or float field. No effect on other
    /// types.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        match &mut self.field_type {
            FieldType::Int { range } | FieldType::Float { range } => {
                *range = Some(NumericRange::new(min, max));
            }
            _ => {}
        }
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn nan_as_missing(mut self) -> Self {
        self.nan_as_missing = true;
        self
    }
}

fn field_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
            .expect("field name pattern is valid")
    })
}

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("version pattern is valid"))
}

/// Versioned contract. Immutable once published; changes produce a new
/// `schema_version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declaration order is the order violations are reported in
    pub fields: Vec<FieldSpec>,
}

impl Contract {
    pub fn new(schema_version: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            schema_version: schema_version.into(),
            description: None,
            fields,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn declares(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Validates the contract structure itself (not a record)
    pub fn validate_structure(&self) -> Result<(), String> {
        if !version_pattern().is_match(&self.schema_version) {
            return Err(format!(
                "schema_version '{}' must match [A-Za-z0-9][A-Za-z0-9._-]*",
                self.schema_version
            ));
        }

        if self.fields.is_empty() {
            return Err("contract must declare at least one field".into());
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !field_name_pattern().is_match(&field.name) {
                return Err(format!("invalid field name '{}'", field.name));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(format!("duplicate field name '{}'", field.name));
            }

            match &field.field_type {
                FieldType::Int { range: Some(r) } | FieldType::Float { range: Some(r) } => {
                    if !r.min.is_finite() || !r.max.is_finite() {
                        return Err(format!("field '{}': range bounds must be finite", field.name));
                    }
                    if r.min > r.max {
                        return Err(format!(
                            "field '{}': range min {} exceeds max {}",
                            field.name, r.min, r.max
                        ));
                    }
                }
                FieldType::Categorical {
                    allowed_values: Some(values),
                } if values.is_empty() => {
                    return Err(format!(
                        "field '{}': allowed_values must not be empty",
                        field.name
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

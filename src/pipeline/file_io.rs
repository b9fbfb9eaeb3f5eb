//! File-backed ingestion and persistence
//!
//! Input is JSON lines or a JSON array of objects. A `schema_version` key
//! inside an object overrides the source's default version for that record;
//! a non-string version is kept as its JSON text so the validator reports
//! the mismatch. Only unparsable JSON or a non-object entry fails the fetch.
//!
//! Output layout per run:
//!
//! ```text
//! <output_dir>/<run_id>/dataset.jsonl
//! <output_dir>/<run_id>/quarantine.jsonl
//! ```
//!
//! Files are written to a temporary name and renamed into place, so a
//! retried write never leaves a half-written file behind.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{io_is_transient, IngestionError, PersistenceError};
use super::io::{IngestionSource, PersistenceSink};
use super::run::InputWindow;
use crate::record::{Record, Value};
use crate::transform::Dataset;
use crate::validation::{RejectedRecord, Violation};

const SCHEMA_VERSION_KEY: &str = "schema_version";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    #[default]
    Jsonl,
    Json,
}

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    format: SourceFormat,
    schema_version: String,
    window_field: Option<String>,
    flatten: bool,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, format: SourceFormat, schema_version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            format,
            schema_version: schema_version.into(),
            window_field: None,
            flatten: false,
        }
    }

    /// Filters records on this timestamp field when the window is bounded.
    ///
    /// Records whose field is absent or unparsable are kept, so the
    /// validator diagnoses them instead of them vanishing silently.
    pub fn with_window_field(mut self, field: impl Into<String>) -> Self {
        self.window_field = Some(field.into());
        self
    }

    /// Flattens nested objects into dotted field names.
    pub fn with_flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses the file contents into records.
    pub fn parse(&self, content: &str) -> Result<Vec<Record>, IngestionError> {
        let objects: Vec<(usize, serde_json::Value)> = match self.format {
            SourceFormat::Jsonl => content
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(i, line)| {
                    serde_json::from_str(line).map(|v| (i + 1, v)).map_err(|e| {
                        IngestionError::permanent(format!(
                            "{}:{}: {}",
                            self.path.display(),
                            i + 1,
                            e
                        ))
                    })
                })
                .collect::<Result<_, _>>()?,
            SourceFormat::Json => {
                let value: serde_json::Value = serde_json::from_str(content).map_err(|e| {
                    IngestionError::permanent(format!("{}: {}", self.path.display(), e))
                })?;
                match value {
                    serde_json::Value::Array(items) => {
                        items.into_iter().enumerate().map(|(i, v)| (i + 1, v)).collect()
                    }
                    _ => {
                        return Err(IngestionError::permanent(format!(
                            "{}: expected a JSON array of objects",
                            self.path.display()
                        )))
                    }
                }
            }
        };

        objects
            .into_iter()
            .map(|(position, value)| self.to_record(position, value))
            .collect()
    }

    fn to_record(&self, position: usize, value: serde_json::Value) -> Result<Record, IngestionError> {
        let mut object = match value {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(IngestionError::permanent(format!(
                    "{} entry {}: expected an object, found {}",
                    self.path.display(),
                    position,
                    other
                )))
            }
        };

        let version = match object.remove(SCHEMA_VERSION_KEY) {
            Some(serde_json::Value::String(v)) => v,
            Some(other) => other.to_string(),
            None => self.schema_version.clone(),
        };

        Ok(Record::from_json_object(&version, &object, self.flatten))
    }

    fn in_window(&self, record: &Record, window: &InputWindow) -> bool {
        let Some(field) = &self.window_field else {
            return true;
        };
        match record.get(field).and_then(|v| v.timestamp_seconds()) {
            Some(ts) => window.contains_seconds(ts),
            None => true,
        }
    }
}

#[async_trait]
impl IngestionSource for FileSource {
    async fn fetch(&self, window: &InputWindow) -> Result<Vec<Record>, IngestionError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ingestion_io_error(&self.path, e))?;

        let mut records = self.parse(&content)?;
        if !window.is_unbounded() {
            records.retain(|r| self.in_window(r, window));
        }
        Ok(records)
    }
}

fn ingestion_io_error(path: &Path, e: io::Error) -> IngestionError {
    IngestionError {
        message: format!("{}: {}", path.display(), e),
        transient: io_is_transient(e.kind()),
    }
}

fn persistence_io_error(path: &Path, e: io::Error) -> PersistenceError {
    PersistenceError {
        message: format!("{}: {}", path.display(), e),
        transient: io_is_transient(e.kind()),
    }
}

/// One quarantine line: the rejected values plus every violation.
#[derive(Debug, Serialize)]
struct QuarantineLine<'a> {
    schema_version: &'a str,
    values: &'a BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    non_scalar: &'a BTreeSet<String>,
    violations: &'a [Violation],
}

#[derive(Debug, Clone)]
pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn run_dir(&self, run_id: Uuid) -> PathBuf {
        self.output_dir.join(run_id.to_string())
    }

    pub fn dataset_path(&self, run_id: Uuid) -> PathBuf {
        self.run_dir(run_id).join("dataset.jsonl")
    }

    pub fn quarantine_path(&self, run_id: Uuid) -> PathBuf {
        self.run_dir(run_id).join("quarantine.jsonl")
    }

    async fn write_lines(&self, path: &Path, lines: Vec<String>) -> Result<(), PersistenceError> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| persistence_io_error(dir, e))?;
        }

        let mut body = String::new();
        for line in lines {
            body.push_str(&line);
            body.push('\n');
        }

        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| persistence_io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| persistence_io_error(path, e))
    }
}

fn to_line<T: Serialize>(value: &T) -> Result<String, PersistenceError> {
    serde_json::to_string(value).map_err(|e| PersistenceError::permanent(e.to_string()))
}

#[async_trait]
impl PersistenceSink for FileSink {
    async fn write(&self, dataset: &Dataset, run_id: Uuid) -> Result<(), PersistenceError> {
        let lines = dataset
            .records
            .iter()
            .map(|r| to_line(&r.values))
            .collect::<Result<Vec<_>, _>>()?;
        self.write_lines(&self.dataset_path(run_id), lines).await
    }

    async fn quarantine(
        &self,
        rejected: &[RejectedRecord],
        run_id: Uuid,
    ) -> Result<(), PersistenceError> {
        let lines = rejected
            .iter()
            .map(|r| {
                to_line(&QuarantineLine {
                    schema_version: &r.record.schema_version,
                    values: &r.record.values,
                    non_scalar: &r.record.non_scalar,
                    violations: &r.outcome.violations,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.write_lines(&self.quarantine_path(run_id), lines).await
    }
}

//! Pipeline configuration
//!
//! Loaded from a JSON file. Every optional key has a default; the whole
//! file is validated once on load, so a run never starts with a value it
//! would reject halfway through.
//!
//! ```json
//! {
//!   "schema_version": "vp-1",
//!   "paths": { "contracts_dir": "contracts", "output_dir": "out" },
//!   "source": { "path": "interactions.jsonl", "window_field": "day" }
//! }
//! ```

mod errors;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drift::{DriftMetric, DriftThresholds};
use crate::pipeline::{
    FileSource, OrchestratorSettings, RetryPolicy, SourceFormat, Stage, StageFailurePolicy,
    StagePolicies,
};
use crate::transform::TransformConfig;
use crate::validation::ExtraFieldPolicy;

pub use errors::{ConfigError, ConfigResult};

/// Where contracts, baselines, the ledger and outputs live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    pub contracts_dir: PathBuf,

    #[serde(default = "default_baseline_log")]
    pub baseline_log: PathBuf,

    #[serde(default = "default_run_ledger")]
    pub run_ledger: PathBuf,

    pub output_dir: PathBuf,
}

fn default_baseline_log() -> PathBuf {
    PathBuf::from("baselines.jsonl")
}

fn default_run_ledger() -> PathBuf {
    PathBuf::from("runs.jsonl")
}

/// Input file of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: PathBuf,

    #[serde(default)]
    pub format: SourceFormat,

    /// Timestamp field the input window filters on
    #[serde(default)]
    pub window_field: Option<String>,

    /// Flatten nested objects into dotted field names
    #[serde(default)]
    pub flatten: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub schema_version: String,

    #[serde(default = "default_min_accept_ratio")]
    pub min_accept_ratio: f64,

    #[serde(default)]
    pub drift_thresholds: BTreeMap<String, DriftThresholds>,

    #[serde(default)]
    pub drift_metrics: BTreeMap<String, DriftMetric>,

    #[serde(default)]
    pub stage_failure_policy: BTreeMap<Stage, StageFailurePolicy>,

    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,

    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,

    #[serde(default)]
    pub extra_field_policy: ExtraFieldPolicy,

    #[serde(default)]
    pub transform: Option<TransformConfig>,

    pub paths: PathsConfig,

    pub source: SourceConfig,
}

fn default_min_accept_ratio() -> f64 {
    0.9
}
fn default_retry_limit() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    200
}
fn default_backoff_max_ms() -> u64 {
    5_000
}
fn default_stage_timeout_ms() -> u64 {
    30_000
}

impl PipelineConfig {
    /// Loads and validates a configuration file.
    ///
    /// Relative paths inside the file are resolved against the file's
    /// directory.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut config = Self::from_json(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })?;

        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Parses and validates a configuration document.
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: PipelineConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse {
                path: "<inline>".to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.schema_version.trim().is_empty() {
            return Err(ConfigError::invalid("schema_version", "must not be empty"));
        }

        if !(0.0..=1.0).contains(&self.min_accept_ratio) {
            return Err(ConfigError::invalid(
                "min_accept_ratio",
                format!("{} is outside 0.0-1.0", self.min_accept_ratio),
            ));
        }

        for (field, thresholds) in &self.drift_thresholds {
            thresholds
                .validate()
                .map_err(|reason| ConfigError::invalid(format!("drift_thresholds.{}", field), reason))?;
        }

        if self.stage_failure_policy.contains_key(&Stage::Done) {
            return Err(ConfigError::invalid(
                "stage_failure_policy",
                "'done' is not a working stage",
            ));
        }

        if self.retry_backoff_base_ms == 0 {
            return Err(ConfigError::invalid("retry_backoff_base_ms", "must be > 0"));
        }
        if self.retry_backoff_max_ms < self.retry_backoff_base_ms {
            return Err(ConfigError::invalid(
                "retry_backoff_max_ms",
                "must not be below retry_backoff_base_ms",
            ));
        }
        if self.stage_timeout_ms == 0 {
            return Err(ConfigError::invalid("stage_timeout_ms", "must be > 0"));
        }

        if let Some(transform) = &self.transform {
            transform
                .validate()
                .map_err(|e| ConfigError::invalid("transform", e.to_string()))?;
        }

        Ok(())
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.paths.contracts_dir);
        resolve(&mut self.paths.baseline_log);
        resolve(&mut self.paths.run_ledger);
        resolve(&mut self.paths.output_dir);
        resolve(&mut self.source.path);
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_limit: self.retry_limit,
            backoff_base: Duration::from_millis(self.retry_backoff_base_ms),
            backoff_max: Duration::from_millis(self.retry_backoff_max_ms),
            stage_timeout: Duration::from_millis(self.stage_timeout_ms),
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            min_accept_ratio: self.min_accept_ratio,
            retry: self.retry_policy(),
            policies: StagePolicies::with_overrides(&self.stage_failure_policy),
            extra_field_policy: self.extra_field_policy,
            drift_thresholds: self.drift_thresholds.clone(),
            drift_metrics: self.drift_metrics.clone(),
        }
    }

    /// File source for the configured input.
    pub fn file_source(&self) -> FileSource {
        self.file_source_at(&self.source.path)
    }

    /// File source reading `path` with the configured format options.
    pub fn file_source_at(&self, path: &Path) -> FileSource {
        let source = FileSource::new(path, self.source.format, self.schema_version.clone())
            .with_flatten(self.source.flatten);
        match &self.source.window_field {
            Some(field) => source.with_window_field(field.clone()),
            None => source,
        }
    }
}

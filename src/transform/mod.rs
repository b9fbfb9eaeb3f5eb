//! Transform stage
//!
//! Turns the accepted records of a batch into the output dataset. Steps run
//! in order; without any configured step the dataset is the accepted
//! records unchanged.

mod cleansing;
mod config;
mod errors;
mod rolling;

use serde::{Deserialize, Serialize};

use crate::record::Record;

pub use cleansing::Cleansing;
pub use config::{
    Aggregation, AggregationOp, CleansingConfig, Condition, RollingFeaturesConfig,
    TransformConfig,
};
pub use errors::{TransformError, TransformResult};
pub use rolling::RollingFeatures;

/// One record-set rewrite.
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, records: Vec<Record>) -> TransformResult<Vec<Record>>;
}

/// Output of a run, handed to the persistence sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub schema_version: String,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn new(schema_version: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            schema_version: schema_version.into(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Default)]
pub struct TransformPipeline {
    steps: Vec<Box<dyn Transformer>>,
}

impl TransformPipeline {
    /// Identity pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &TransformConfig) -> TransformResult<Self> {
        config.validate()?;
        let mut pipeline = Self::new();
        if let Some(cleansing) = &config.cleansing {
            pipeline = pipeline.with_step(Cleansing::new(cleansing.clone()));
        }
        if let Some(features) = &config.features {
            pipeline = pipeline.with_step(RollingFeatures::new(features.clone()));
        }
        Ok(pipeline)
    }

    pub fn with_step(mut self, step: impl Transformer + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, schema_version: &str, records: Vec<Record>) -> TransformResult<Dataset> {
        let records = self
            .steps
            .iter()
            .try_fold(records, |records, step| step.apply(records))?;
        Ok(Dataset::new(schema_version, records))
    }
}

impl std::fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformPipeline")
            .field("steps", &self.step_names())
            .finish()
    }
}

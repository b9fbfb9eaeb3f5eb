//! Ingestion and persistence seams
//!
//! The orchestrator only talks to these traits. File-backed implementations
//! live in `file_io`; the in-memory ones here back tests and dry runs.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use super::errors::{IngestionError, PersistenceError};
use super::run::InputWindow;
use crate::record::Record;
use crate::transform::Dataset;
use crate::validation::RejectedRecord;

/// Supplies the raw records of one input window.
#[async_trait]
pub trait IngestionSource: Send + Sync {
    async fn fetch(&self, window: &InputWindow) -> Result<Vec<Record>, IngestionError>;
}

/// Receives the run's outputs. Writes for a `run_id` must be idempotent
/// since the orchestrator retries them.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn write(&self, dataset: &Dataset, run_id: Uuid) -> Result<(), PersistenceError>;

    async fn quarantine(
        &self,
        rejected: &[RejectedRecord],
        run_id: Uuid,
    ) -> Result<(), PersistenceError>;
}

/// Serves a fixed batch regardless of the window.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: Vec<Record>,
}

impl MemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl IngestionSource for MemorySource {
    async fn fetch(&self, _window: &InputWindow) -> Result<Vec<Record>, IngestionError> {
        Ok(self.records.clone())
    }
}

/// Keeps written datasets and quarantined records per run.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    datasets: Mutex<HashMap<Uuid, Dataset>>,
    quarantined: Mutex<HashMap<Uuid, Vec<RejectedRecord>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dataset(&self, run_id: Uuid) -> Option<Dataset> {
        self.datasets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&run_id)
            .cloned()
    }

    pub fn quarantined(&self, run_id: Uuid) -> Vec<RejectedRecord> {
        self.quarantined
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&run_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PersistenceSink for MemoryPersistence {
    async fn write(&self, dataset: &Dataset, run_id: Uuid) -> Result<(), PersistenceError> {
        self.datasets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id, dataset.clone());
        Ok(())
    }

    async fn quarantine(
        &self,
        rejected: &[RejectedRecord],
        run_id: Uuid,
    ) -> Result<(), PersistenceError> {
        self.quarantined
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id, rejected.to_vec());
        Ok(())
    }
}

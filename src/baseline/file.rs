//! File-backed baseline store
//!
//! Every `put` appends the full baseline to a checksummed journal and syncs
//! it before the in-memory snapshot is swapped. Reopening replays the log
//! and keeps the last logged entry per schema version, matching what `get`
//! returned before the restart.
//!
//! Writers are serialized across the append and the swap, so log order and
//! swap order agree. Readers are never blocked by a write in progress; they
//! keep seeing the previous snapshot until the swap.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::errors::{BaselineError, BaselineResult};
use super::model::Baseline;
use super::store::BaselineStore;
use crate::journal::Journal;

#[derive(Debug)]
pub struct FileBaselineStore {
    journal: Journal,
    current: RwLock<HashMap<String, Arc<Baseline>>>,
    writer: Mutex<()>,
}

impl FileBaselineStore {
    /// Opens the log at `path`, creating it if needed.
    ///
    /// A torn trailing entry is dropped; corruption elsewhere is a
    /// `Storage` error.
    pub fn open(path: impl AsRef<Path>) -> BaselineResult<Self> {
        let path = path.as_ref();
        let (journal, replay) = Journal::open::<Baseline>(path)
            .map_err(|e| BaselineError::storage(path.display().to_string(), e.to_string()))?;

        let mut current: HashMap<String, Arc<Baseline>> = HashMap::new();
        for baseline in replay.entries {
            current.insert(baseline.schema_version.clone(), Arc::new(baseline));
        }

        Ok(Self {
            journal,
            current: RwLock::new(current),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.journal.path().to_path_buf()
    }

    /// Every logged baseline for `schema_version`, oldest first.
    pub fn history(&self, schema_version: &str) -> BaselineResult<Vec<Baseline>> {
        let replay = Journal::read_all::<Baseline>(self.journal.path()).map_err(|e| {
            BaselineError::storage(self.journal.path().display().to_string(), e.to_string())
        })?;
        let mut entries: Vec<Baseline> = replay
            .entries
            .into_iter()
            .filter(|b| b.schema_version == schema_version)
            .collect();
        entries.sort_by_key(|b| b.computed_at);
        Ok(entries)
    }
}

impl BaselineStore for FileBaselineStore {
    fn get(&self, schema_version: &str) -> BaselineResult<Arc<Baseline>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(schema_version)
            .cloned()
            .ok_or_else(|| BaselineError::NoBaseline(schema_version.to_string()))
    }

    fn put(&self, baseline: Baseline) -> BaselineResult<()> {
        baseline.ensure_finite()?;
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        // Durable first: a crash after this point replays the new baseline
        self.journal.append(&baseline).map_err(|e| {
            BaselineError::storage(self.journal.path().display().to_string(), e.to_string())
        })?;

        let key = baseline.schema_version.clone();
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::new(baseline));
        Ok(())
    }
}

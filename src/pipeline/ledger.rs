//! Run ledger
//!
//! - Every stage transition of a run is appended
//! - Every drift report is appended
//! - The terminal run record is appended last
//! - Append-only and durable: file appends are synced before returning

use std::io;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::run::{PipelineRun, RunStatus, Stage};
use crate::drift::BatchDriftReport;
use crate::journal::Journal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEntry {
    Transition {
        run_id: Uuid,
        stage: Stage,
        status: RunStatus,
        at: DateTime<Utc>,
    },
    DriftReport {
        run_id: Uuid,
        report: BatchDriftReport,
    },
    Run {
        run: PipelineRun,
    },
}

impl LedgerEntry {
    pub fn transition(run: &PipelineRun) -> Self {
        LedgerEntry::Transition {
            run_id: run.run_id,
            stage: run.stage,
            status: run.status,
            at: Utc::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            LedgerEntry::Transition { run_id, .. } => *run_id,
            LedgerEntry::DriftReport { run_id, .. } => *run_id,
            LedgerEntry::Run { run } => run.run_id,
        }
    }
}

/// Append-only store of run history.
pub trait RunLedger: Send + Sync {
    /// Appends one entry; it is visible once this returns.
    fn append(&self, entry: &LedgerEntry) -> io::Result<()>;

    /// All entries in append order.
    fn entries(&self) -> io::Result<Vec<LedgerEntry>>;

    /// Terminal records of every finished run, in completion order.
    fn runs(&self) -> io::Result<Vec<PipelineRun>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter_map(|e| match e {
                LedgerEntry::Run { run } => Some(run),
                _ => None,
            })
            .collect())
    }

    /// Entries belonging to one run.
    fn history(&self, run_id: Uuid) -> io::Result<Vec<LedgerEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.run_id() == run_id)
            .collect())
    }
}

/// Ledger backed by a checksummed JSON-lines journal.
#[derive(Debug)]
pub struct FileRunLedger {
    journal: Journal,
}

impl FileRunLedger {
    /// Open or create a ledger file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let (journal, _replay) = Journal::open::<LedgerEntry>(path)?;
        Ok(Self { journal })
    }

    pub fn path(&self) -> &Path {
        self.journal.path()
    }
}

impl RunLedger for FileRunLedger {
    fn append(&self, entry: &LedgerEntry) -> io::Result<()> {
        self.journal.append(entry)
    }

    fn entries(&self) -> io::Result<Vec<LedgerEntry>> {
        Journal::read_all(self.journal.path()).map(|replay| replay.entries)
    }
}

/// In-memory ledger for testing.
#[derive(Debug, Default)]
pub struct MemoryRunLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryRunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RunLedger for MemoryRunLedger {
    fn append(&self, entry: &LedgerEntry) -> io::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }

    fn entries(&self) -> io::Result<Vec<LedgerEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::InputWindow;
    use tempfile::tempdir;

    fn finished_run() -> PipelineRun {
        let mut run = PipelineRun::new("v1", InputWindow::unbounded());
        run.start();
        run.advance(Stage::Done).unwrap();
        run.finish(RunStatus::Succeeded);
        run
    }

    #[test]
    fn test_memory_ledger() {
        let ledger = MemoryRunLedger::new();
        let run = finished_run();
        ledger.append(&LedgerEntry::transition(&run)).unwrap();
        ledger.append(&LedgerEntry::Run { run: run.clone() }).unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.runs().unwrap(), vec![run.clone()]);
        assert_eq!(ledger.history(run.run_id).unwrap().len(), 2);
        assert!(ledger.history(Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn test_file_ledger_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let run = finished_run();

        let ledger = FileRunLedger::open(&path).unwrap();
        ledger.append(&LedgerEntry::transition(&run)).unwrap();
        ledger.append(&LedgerEntry::Run { run: run.clone() }).unwrap();
        drop(ledger);

        let ledger = FileRunLedger::open(&path).unwrap();
        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], LedgerEntry::Transition { .. }));
        assert_eq!(ledger.runs().unwrap(), vec![run]);
    }

    #[test]
    fn test_entry_tagging() {
        let run = finished_run();
        let json = serde_json::to_value(LedgerEntry::transition(&run)).unwrap();
        assert_eq!(json["kind"], "transition");
        assert_eq!(json["stage"], "done");
        assert_eq!(json["status"], "succeeded");
    }
}

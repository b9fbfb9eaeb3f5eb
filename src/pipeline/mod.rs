//! Batch pipeline
//!
//! One run moves a window of interaction records through
//! ingest, validate, stats, drift, transform and persist. The orchestrator
//! owns the sequencing; sources, sinks, baselines and the ledger are
//! injected behind traits.

mod errors;
mod file_io;
mod io;
mod ledger;
mod orchestrator;
mod policy;
mod retry;
mod run;

pub(crate) use errors::io_is_transient;
pub use errors::{IngestionError, PersistenceError, PipelineError, PipelineResult};
pub use file_io::{FileSink, FileSource, SourceFormat};
pub use io::{IngestionSource, MemoryPersistence, MemorySource, PersistenceSink};
pub use ledger::{FileRunLedger, LedgerEntry, MemoryRunLedger, RunLedger};
pub use orchestrator::{CancelHandle, Orchestrator, OrchestratorBuilder, OrchestratorSettings};
pub use policy::{StageFailurePolicy, StagePolicies};
pub use retry::RetryPolicy;
pub use run::{InputWindow, PipelineRun, RunError, RunStatus, RunSummary, Stage, StageSkip};

//! Orchestrator Scenario Tests
//!
//! End-to-end runs over in-memory collaborators:
//! - Degenerate batches stop before transform
//! - A missing baseline skips drift and the run carries on
//! - Transient source failures are retried up to the limit
//! - Critical drift only fails the run when drift is set to abort
//! - Cancellation takes effect at the next stage boundary

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use featuregate::baseline::{Baseline, BaselineStore, MemoryBaselineStore};
use featuregate::contract::{Contract, FieldSpec};
use featuregate::drift::DriftSeverity;
use featuregate::observability::{Event, MemorySink};
use featuregate::pipeline::{
    CancelHandle, FileSource, IngestionError, IngestionSource, InputWindow, LedgerEntry, MemoryPersistence,
    MemoryRunLedger, MemorySource, Orchestrator, OrchestratorBuilder, OrchestratorSettings,
    PersistenceError, PersistenceSink, RetryPolicy, RunLedger, RunStatus, SourceFormat, Stage,
    StageFailurePolicy,
};
use featuregate::record::Record;
use featuregate::transform::{Dataset, TransformError, TransformPipeline, TransformResult, Transformer};
use featuregate::validation::{RejectedRecord, ViolationRule};
use tempfile::TempDir;
use uuid::Uuid;

// =============================================================================
// Helper Functions
// =============================================================================

fn contract() -> Arc<Contract> {
    Arc::new(Contract::new(
        "vp-1",
        vec![
            FieldSpec::string("user_id"),
            FieldSpec::float("amount").with_range(0.0, 100_000.0),
            FieldSpec::categorical("value_prop", ["cashback", "points"]),
        ],
    ))
}

fn record(i: usize, amount: f64) -> Record {
    Record::new("vp-1")
        .with("user_id", format!("u{}", i))
        .with("amount", amount)
        .with("value_prop", if i % 2 == 0 { "cashback" } else { "points" })
}

/// `good` valid records around `center`, then `bad` negative amounts.
fn batch(good: usize, bad: usize, center: f64) -> Vec<Record> {
    let mut records: Vec<Record> = (0..good)
        .map(|i| record(i, center + (i % 20) as f64))
        .collect();
    records.extend((0..bad).map(|i| record(good + i, -5.0)));
    records
}

fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        retry: RetryPolicy {
            retry_limit: 3,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(4),
            stage_timeout: Duration::from_millis(500),
        },
        ..OrchestratorSettings::default()
    }
}

struct Harness {
    sink: Arc<MemoryPersistence>,
    events: Arc<MemorySink>,
    ledger: Arc<MemoryRunLedger>,
    baselines: Arc<MemoryBaselineStore>,
}

impl Harness {
    fn new() -> Self {
        Self {
            sink: Arc::new(MemoryPersistence::new()),
            events: Arc::new(MemorySink::new()),
            ledger: Arc::new(MemoryRunLedger::new()),
            baselines: Arc::new(MemoryBaselineStore::new()),
        }
    }

    fn with_baseline(self, records: Vec<Record>) -> Self {
        let baseline = Baseline::recalibrate(&contract(), records, Utc::now()).unwrap();
        self.baselines.put(baseline).unwrap();
        self
    }

    fn builder(&self, source: Arc<dyn IngestionSource>) -> OrchestratorBuilder {
        self.builder_with_sink(source, self.sink.clone())
    }

    fn builder_with_sink(
        &self,
        source: Arc<dyn IngestionSource>,
        sink: Arc<dyn PersistenceSink>,
    ) -> OrchestratorBuilder {
        Orchestrator::builder(contract(), source, sink)
            .events(self.events.clone())
            .ledger(self.ledger.clone())
            .baselines(self.baselines.clone())
            .settings(fast_settings())
    }

    fn stages_entered(&self, run_id: Uuid) -> Vec<Stage> {
        self.ledger
            .history(run_id)
            .unwrap()
            .into_iter()
            .filter_map(|e| match e {
                LedgerEntry::Transition { stage, .. } => Some(stage),
                _ => None,
            })
            .collect()
    }
}

/// Fails transiently `failures` times, then serves the records.
struct FlakySource {
    failures: u32,
    calls: AtomicU32,
    records: Vec<Record>,
}

impl FlakySource {
    fn new(failures: u32, records: Vec<Record>) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
            records,
        }
    }
}

#[async_trait]
impl IngestionSource for FlakySource {
    async fn fetch(&self, _window: &InputWindow) -> Result<Vec<Record>, IngestionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(IngestionError::transient(format!("upstream hiccup {}", call)));
        }
        Ok(self.records.clone())
    }
}

/// Cancels the run while its records are being fetched.
struct CancellingSource {
    handle: CancelHandle,
    records: Vec<Record>,
}

#[async_trait]
impl IngestionSource for CancellingSource {
    async fn fetch(&self, _window: &InputWindow) -> Result<Vec<Record>, IngestionError> {
        self.handle.cancel();
        Ok(self.records.clone())
    }
}

struct BrokenSink;

#[async_trait]
impl PersistenceSink for BrokenSink {
    async fn write(&self, _dataset: &Dataset, _run_id: Uuid) -> Result<(), PersistenceError> {
        Err(PersistenceError::permanent("disk full"))
    }

    async fn quarantine(&self, _rejected: &[RejectedRecord], _run_id: Uuid) -> Result<(), PersistenceError> {
        Err(PersistenceError::permanent("disk full"))
    }
}

struct FailingStep;

impl Transformer for FailingStep {
    fn name(&self) -> &str {
        "failing"
    }

    fn apply(&self, _records: Vec<Record>) -> TransformResult<Vec<Record>> {
        Err(TransformError::InvalidConfig("boom".to_string()))
    }
}

fn memory(records: Vec<Record>) -> Arc<dyn IngestionSource> {
    Arc::new(MemorySource::new(records))
}

// =============================================================================
// Scenario Tests
// =============================================================================

/// Scenario: 1000 records, 150 rejected, min_accept_ratio 0.9.
#[tokio::test]
async fn test_degenerate_batch_stops_before_transform() {
    let h = Harness::new();
    let orch = h.builder(memory(batch(850, 150, 10.0))).build();

    let run = orch.run(InputWindow::unbounded()).await;

    assert_eq!(run.status, RunStatus::Failed);
    let error = run.error.as_ref().unwrap();
    assert_eq!(error.code, "FG_DEGENERATE_BATCH");
    assert_eq!(error.stage, Stage::Validate);
    assert_eq!(run.summary.records_accepted, 850);
    assert_eq!(run.summary.records_rejected, 150);

    let stages = h.stages_entered(run.run_id);
    assert!(!stages.contains(&Stage::Transform));
    assert!(h.sink.dataset(run.run_id).is_none());
    // Rejected records are still quarantined
    assert_eq!(h.sink.quarantined(run.run_id).len(), 150);
    assert_eq!(h.events.count(Event::RunFailed), 1);
}

/// Scenario: a brand-new schema version has no baseline.
#[tokio::test]
async fn test_missing_baseline_skips_drift() {
    let h = Harness::new();
    let orch = h.builder(memory(batch(100, 0, 10.0))).build();

    let run = orch.run(InputWindow::unbounded()).await;

    assert_eq!(run.status, RunStatus::Succeeded);
    assert!(run.summary.drift.is_none());
    assert!(run.summary.drift_skipped.is_some());
    assert_eq!(h.events.count(Event::DriftSkipped), 1);
    assert_eq!(
        h.stages_entered(run.run_id),
        vec![
            Stage::Ingest,
            Stage::Validate,
            Stage::Stats,
            Stage::Drift,
            Stage::Transform,
            Stage::Persist,
            Stage::Done
        ]
    );
    assert_eq!(h.sink.dataset(run.run_id).map(|d| d.len()), Some(100));
}

#[tokio::test]
async fn test_empty_batch_is_degenerate() {
    let h = Harness::new();
    let run = h.builder(memory(Vec::new())).build().run(InputWindow::unbounded()).await;
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.unwrap().code, "FG_DEGENERATE_BATCH");
}

#[tokio::test]
async fn test_rejections_yield_partial_success() {
    let h = Harness::new();
    let run = h.builder(memory(batch(95, 5, 10.0))).build().run(InputWindow::unbounded()).await;

    assert_eq!(run.status, RunStatus::PartiallySucceeded);
    assert_eq!(run.summary.records_written, 95);
    assert_eq!(h.sink.quarantined(run.run_id).len(), 5);
    let violations = run.summary.violations.unwrap();
    assert_eq!(violations.by_rule.get("range"), Some(&5));
}

#[tokio::test]
async fn test_nested_value_in_one_row_is_quarantined() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.jsonl");
    let mut body: String = (0..99)
        .map(|i| {
            format!(
                "{{\"schema_version\": \"vp-1\", \"user_id\": \"u{}\", \"amount\": {}.5, \"value_prop\": \"cashback\"}}\n",
                i,
                10 + i % 20
            )
        })
        .collect();
    body.push_str("{\"user_id\": \"bad\", \"amount\": {\"x\": 1}, \"value_prop\": \"points\"}\n");
    std::fs::write(&path, body).unwrap();

    let h = Harness::new();
    let source = Arc::new(FileSource::new(&path, SourceFormat::Jsonl, "vp-1"));
    let run = h.builder(source).build().run(InputWindow::unbounded()).await;

    assert_eq!(run.status, RunStatus::PartiallySucceeded);
    assert_eq!(run.summary.records_ingested, 100);
    assert_eq!(run.summary.records_written, 99);
    let quarantined = h.sink.quarantined(run.run_id);
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].record.get("user_id").and_then(|v| v.as_str()), Some("bad"));
    assert_eq!(quarantined[0].outcome.violations[0].field, "amount");
    assert_eq!(quarantined[0].outcome.violations[0].rule, ViolationRule::Type);
}

#[tokio::test]
async fn test_numeric_schema_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.jsonl");
    let mut body: String = (0..99)
        .map(|i| format!("{{\"user_id\": \"u{}\", \"amount\": 12.0, \"value_prop\": \"points\"}}\n", i))
        .collect();
    body.push_str("{\"schema_version\": 7, \"user_id\": \"x\", \"amount\": 12.0, \"value_prop\": \"points\"}\n");
    std::fs::write(&path, body).unwrap();

    let h = Harness::new();
    let source = Arc::new(FileSource::new(&path, SourceFormat::Jsonl, "vp-1"));
    let run = h.builder(source).build().run(InputWindow::unbounded()).await;

    assert_eq!(run.status, RunStatus::PartiallySucceeded);
    let quarantined = h.sink.quarantined(run.run_id);
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].record.schema_version, "7");
    assert_eq!(quarantined[0].outcome.violations[0].rule, ViolationRule::SchemaVersion);
}

// =============================================================================
// Retry Tests
// =============================================================================

#[tokio::test]
async fn test_transient_failures_within_limit_succeed() {
    let h = Harness::new();
    let source = Arc::new(FlakySource::new(3, batch(50, 0, 10.0)));
    let run = h.builder(source.clone()).build().run(InputWindow::unbounded()).await;

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.attempts.get(&Stage::Ingest), Some(&4));
    assert_eq!(h.events.count(Event::RetryScheduled), 3);
}

#[tokio::test]
async fn test_transient_failures_beyond_limit_fail() {
    let h = Harness::new();
    let source = Arc::new(FlakySource::new(4, batch(50, 0, 10.0)));
    let run = h.builder(source.clone()).build().run(InputWindow::unbounded()).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_ref().unwrap().code, "FG_INGESTION");
    assert_eq!(source.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_permanent_persist_failure_is_not_retried() {
    let h = Harness::new();
    let orch = h
        .builder_with_sink(memory(batch(50, 0, 10.0)), Arc::new(BrokenSink))
        .build();
    let run = orch.run(InputWindow::unbounded()).await;

    assert_eq!(run.status, RunStatus::Failed);
    let error = run.error.as_ref().unwrap();
    assert_eq!(error.code, "FG_PERSISTENCE");
    assert_eq!(error.stage, Stage::Persist);
    assert_eq!(run.attempts.get(&Stage::Persist), Some(&1));
}

// =============================================================================
// Drift Gate Tests
// =============================================================================

#[tokio::test]
async fn test_critical_drift_is_advisory_by_default() {
    let h = Harness::new().with_baseline(batch(200, 0, 10.0));
    let run = h.builder(memory(batch(200, 0, 5_000.0))).build().run(InputWindow::unbounded()).await;

    assert_eq!(run.status, RunStatus::Succeeded);
    let report = run.summary.drift.as_ref().unwrap();
    assert_eq!(report.overall_severity, DriftSeverity::Critical);
    assert!(h.sink.dataset(run.run_id).is_some());
    assert!(h
        .ledger
        .history(run.run_id)
        .unwrap()
        .iter()
        .any(|e| matches!(e, LedgerEntry::DriftReport { .. })));
}

#[tokio::test]
async fn test_critical_drift_aborts_when_gated() {
    let h = Harness::new().with_baseline(batch(200, 0, 10.0));
    let mut settings = fast_settings();
    settings.policies.set(Stage::Drift, StageFailurePolicy::Abort);

    let run = h
        .builder(memory(batch(200, 0, 5_000.0)))
        .settings(settings)
        .build()
        .run(InputWindow::unbounded())
        .await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_ref().unwrap().code, "FG_DRIFT_GATE");
    assert!(h.sink.dataset(run.run_id).is_none());
    assert!(run.summary.drift.is_some());
}

#[tokio::test]
async fn test_stable_batch_reports_no_drift() {
    let h = Harness::new().with_baseline(batch(200, 0, 10.0));
    let run = h.builder(memory(batch(200, 0, 10.0))).build().run(InputWindow::unbounded()).await;

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(
        run.summary.drift.as_ref().map(|r| r.overall_severity),
        Some(DriftSeverity::None)
    );
}

// =============================================================================
// Transform Policy Tests
// =============================================================================

#[tokio::test]
async fn test_transform_failure_aborts_by_default() {
    let h = Harness::new();
    let run = h
        .builder(memory(batch(20, 0, 10.0)))
        .transform(TransformPipeline::new().with_step(FailingStep))
        .build()
        .run(InputWindow::unbounded())
        .await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_ref().unwrap().code, "FG_TRANSFORM_CONFIG");
}

#[tokio::test]
async fn test_transform_failure_can_be_skipped() {
    let h = Harness::new();
    let mut settings = fast_settings();
    settings.policies.set(Stage::Transform, StageFailurePolicy::SkipAndContinue);

    let run = h
        .builder(memory(batch(20, 0, 10.0)))
        .transform(TransformPipeline::new().with_step(FailingStep))
        .settings(settings)
        .build()
        .run(InputWindow::unbounded())
        .await;

    assert_eq!(run.status, RunStatus::PartiallySucceeded);
    assert_eq!(run.summary.skipped_stages.len(), 1);
    assert_eq!(run.summary.skipped_stages[0].stage, Stage::Transform);
    assert_eq!(h.sink.dataset(run.run_id).map(|d| d.len()), Some(20));
    assert!(h
        .events
        .events()
        .iter()
        .any(|e| e.event == Event::StageSkipped && e.stage.as_deref() == Some("transform")));
}

// =============================================================================
// Cancellation Tests
// =============================================================================

#[tokio::test]
async fn test_cancel_takes_effect_at_next_stage() {
    let h = Harness::new();
    let handle = CancelHandle::default();
    let source = Arc::new(CancellingSource {
        handle: handle.clone(),
        records: batch(20, 0, 10.0),
    });

    let run = h
        .builder(source)
        .cancel_handle(handle)
        .build()
        .run(InputWindow::unbounded())
        .await;

    assert_eq!(run.status, RunStatus::Failed);
    let error = run.error.as_ref().unwrap();
    assert_eq!(error.code, "FG_CANCELLED");
    assert_eq!(h.stages_entered(run.run_id), vec![Stage::Ingest]);
    assert_eq!(run.summary.records_ingested, 20);

    let runs = h.ledger.runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
}

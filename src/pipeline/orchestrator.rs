//! Batch orchestrator
//!
//! Drives one run through the stages:
//!
//! ```text
//! ingest -> validate -> stats -> drift -> transform -> persist -> done
//! ```
//!
//! - Ingest and persistence writes are retried on transient failures
//! - Rejected records are quarantined and the run goes on with the rest
//! - An accepted fraction below `min_accept_ratio` stops the run before
//!   transform, whatever the stage policy
//! - A missing baseline skips drift with a warning
//! - Cancellation is honored at stage boundaries
//!
//! CPU-bound stages run on the blocking pool; rayon parallelizes inside.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinError;

use super::errors::{PipelineError, PipelineResult};
use super::io::{IngestionSource, PersistenceSink};
use super::ledger::{LedgerEntry, MemoryRunLedger, RunLedger};
use super::policy::{StageFailurePolicy, StagePolicies};
use super::retry::RetryPolicy;
use super::run::{InputWindow, PipelineRun, Stage, StageSkip};
use crate::baseline::{BaselineStore, MemoryBaselineStore};
use crate::contract::Contract;
use crate::drift::{DriftMetric, DriftMonitor, DriftSeverity, ThresholdOverrides};
use crate::observability::{Event, EventSink, Level, NullSink, RunLogger, StageScope};
use crate::record::Record;
use crate::stats::{compute_batch_statistics, BatchStatistics};
use crate::transform::{Dataset, TransformPipeline};
use crate::validation::{ContractValidator, ExtraFieldPolicy, ValidationReport, ViolationCounters};

/// Tunables of the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub min_accept_ratio: f64,
    pub retry: RetryPolicy,
    pub policies: StagePolicies,
    pub extra_field_policy: ExtraFieldPolicy,
    pub drift_thresholds: ThresholdOverrides,
    pub drift_metrics: BTreeMap<String, DriftMetric>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            min_accept_ratio: 0.9,
            retry: RetryPolicy::default(),
            policies: StagePolicies::default(),
            extra_field_policy: ExtraFieldPolicy::default(),
            drift_thresholds: ThresholdOverrides::new(),
            drift_metrics: BTreeMap::new(),
        }
    }
}

/// Requests cancellation of the runs of one orchestrator.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct Orchestrator {
    contract: Arc<Contract>,
    source: Arc<dyn IngestionSource>,
    sink: Arc<dyn PersistenceSink>,
    baselines: Arc<dyn BaselineStore>,
    ledger: Arc<dyn RunLedger>,
    events: Arc<dyn EventSink>,
    transform: Arc<TransformPipeline>,
    monitor: DriftMonitor,
    settings: OrchestratorSettings,
    cancel: CancelHandle,
}

pub struct OrchestratorBuilder {
    contract: Arc<Contract>,
    source: Arc<dyn IngestionSource>,
    sink: Arc<dyn PersistenceSink>,
    baselines: Option<Arc<dyn BaselineStore>>,
    ledger: Option<Arc<dyn RunLedger>>,
    events: Option<Arc<dyn EventSink>>,
    transform: Option<TransformPipeline>,
    settings: OrchestratorSettings,
    cancel: CancelHandle,
}

impl OrchestratorBuilder {
    pub fn baselines(mut self, store: Arc<dyn BaselineStore>) -> Self {
        self.baselines = Some(store);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn RunLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn transform(mut self, pipeline: TransformPipeline) -> Self {
        self.transform = Some(pipeline);
        self
    }

    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Shares an existing cancel handle instead of a fresh one.
    pub fn cancel_handle(mut self, handle: CancelHandle) -> Self {
        self.cancel = handle;
        self
    }

    pub fn build(self) -> Orchestrator {
        let monitor = DriftMonitor::with_metrics(self.settings.drift_metrics.clone());
        Orchestrator {
            contract: self.contract,
            source: self.source,
            sink: self.sink,
            baselines: self
                .baselines
                .unwrap_or_else(|| Arc::new(MemoryBaselineStore::new())),
            ledger: self.ledger.unwrap_or_else(|| Arc::new(MemoryRunLedger::new())),
            events: self.events.unwrap_or_else(|| Arc::new(NullSink)),
            transform: Arc::new(self.transform.unwrap_or_default()),
            monitor,
            settings: self.settings,
            cancel: self.cancel,
        }
    }
}

fn join_error(stage: Stage, e: JoinError) -> PipelineError {
    PipelineError::Internal(format!("{} worker failed: {}", stage, e))
}

/// Emits `STAGE_FAILED` and hands the error back.
fn fail(scope: StageScope<'_>, error: PipelineError) -> PipelineError {
    scope.fail(error.code(), &error.to_string());
    error
}

impl Orchestrator {
    /// Starts building an orchestrator for one contract.
    ///
    /// Unset collaborators default to in-memory baseline store and ledger,
    /// a discarding event sink and the identity transform.
    pub fn builder(
        contract: Arc<Contract>,
        source: Arc<dyn IngestionSource>,
        sink: Arc<dyn PersistenceSink>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            contract,
            source,
            sink,
            baselines: None,
            ledger: None,
            events: None,
            transform: None,
            settings: OrchestratorSettings::default(),
            cancel: CancelHandle::default(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Executes one run to a terminal status.
    ///
    /// Errors never escape: they end up in `PipelineRun::error` and in the
    /// event stream.
    pub async fn run(&self, window: InputWindow) -> PipelineRun {
        let mut run = PipelineRun::new(self.contract.schema_version.clone(), window);
        let logger = RunLogger::new(Arc::clone(&self.events)).for_run(run.run_id);

        run.start();
        logger.info(
            Event::RunBegin,
            json!({
                "schema_version": run.schema_version,
                "window": run.input_window,
            }),
        );

        match self.execute(&mut run, &logger).await {
            Ok(()) => {
                let status = run.success_status();
                run.finish(status);
                logger.info(
                    Event::RunComplete,
                    json!({"status": status.as_str(), "summary": run.summary}),
                );
            }
            Err(error) => {
                run.fail(&error);
                logger.log(
                    Level::Error,
                    Event::RunFailed,
                    Some(run.stage.as_str()),
                    json!({
                        "code": error.code(),
                        "reason": error.to_string(),
                        "summary": run.summary,
                    }),
                );
            }
        }

        if let Err(e) = self.ledger.append(&LedgerEntry::Run { run: run.clone() }) {
            logger.error(Event::LedgerWriteFailed, json!({"reason": e.to_string()}));
        }
        run
    }

    async fn execute(&self, run: &mut PipelineRun, logger: &RunLogger) -> PipelineResult<()> {
        let records = self.ingest(run, logger).await?;
        let accepted = self.validate(run, logger, records).await?;
        let (accepted, stats) = self.compute_stats(run, logger, accepted).await?;
        self.check_drift(run, logger, stats).await?;
        let dataset = self.transform(run, logger, accepted).await?;
        self.persist(run, logger, dataset).await?;

        run.advance(Stage::Done)?;
        self.record_transition(run)
    }

    /// Cancellation check, stage move and ledger transition.
    fn enter(&self, run: &mut PipelineRun, stage: Stage) -> PipelineResult<()> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(stage));
        }
        run.advance(stage)?;
        self.record_transition(run)
    }

    fn record_transition(&self, run: &PipelineRun) -> PipelineResult<()> {
        self.ledger
            .append(&LedgerEntry::transition(run))
            .map_err(|e| PipelineError::Ledger(e.to_string()))
    }

    /// Applies the current stage's failure policy to `error`.
    fn tolerate(
        &self,
        run: &mut PipelineRun,
        scope: StageScope<'_>,
        error: PipelineError,
    ) -> PipelineResult<()> {
        let stage = run.stage;
        if error.is_hard_stop()
            || self.settings.policies.get(stage) == StageFailurePolicy::Abort
        {
            return Err(fail(scope, error));
        }
        scope.skip(error.code(), &error.to_string());
        run.summary.skipped_stages.push(StageSkip {
            stage,
            code: error.code().to_string(),
            reason: error.to_string(),
        });
        Ok(())
    }

    async fn ingest(&self, run: &mut PipelineRun, logger: &RunLogger) -> PipelineResult<Vec<Record>> {
        self.enter(run, Stage::Ingest)?;
        let scope = StageScope::begin(logger, Stage::Ingest.as_str());

        let window = run.input_window.clone();
        let mut attempts = 0;
        let fetched = self
            .settings
            .retry
            .run(Stage::Ingest, logger, &mut attempts, || self.source.fetch(&window))
            .await;
        run.add_attempts(Stage::Ingest, attempts);

        let records = match fetched {
            Ok(records) => {
                scope.complete(json!({"records": records.len(), "attempts": attempts}));
                records
            }
            Err(error) => {
                self.tolerate(run, scope, error)?;
                Vec::new()
            }
        };
        run.summary.records_ingested = records.len();
        Ok(records)
    }

    async fn validate(
        &self,
        run: &mut PipelineRun,
        logger: &RunLogger,
        records: Vec<Record>,
    ) -> PipelineResult<Vec<Record>> {
        self.enter(run, Stage::Validate)?;
        let scope = StageScope::begin(logger, Stage::Validate.as_str());

        let validator = ContractValidator::new(self.settings.extra_field_policy);
        let contract = Arc::clone(&self.contract);
        let counters = Arc::new(ViolationCounters::new());
        let worker_counters = Arc::clone(&counters);
        let report: ValidationReport = match tokio::task::spawn_blocking(move || {
            validator.validate(records, &contract, &worker_counters)
        })
        .await
        {
            Ok(report) => report,
            Err(e) => return Err(fail(scope, join_error(Stage::Validate, e))),
        };

        let snapshot = counters.snapshot();
        let total = report.total();
        let accepted_fraction = report.accepted_fraction();
        run.summary.records_accepted = report.accepted.len();
        run.summary.records_rejected = report.rejected.len();
        run.summary.violations = Some(snapshot.clone());

        let mut quarantined = Ok(());
        if !report.rejected.is_empty() {
            logger.log(
                Level::Warn,
                Event::ValidationRejections,
                Some(Stage::Validate.as_str()),
                json!({
                    "rejected": report.rejected.len(),
                    "total": total,
                    "by_rule": snapshot.by_rule,
                }),
            );

            let rejected = &report.rejected;
            let run_id = run.run_id;
            let mut attempts = 0;
            quarantined = self
                .settings
                .retry
                .run(Stage::Validate, logger, &mut attempts, || {
                    self.sink.quarantine(rejected, run_id)
                })
                .await;
            run.add_attempts(Stage::Validate, attempts);
        }

        if accepted_fraction < self.settings.min_accept_ratio {
            if let Err(q) = &quarantined {
                logger.log(
                    Level::Error,
                    Event::StageFailed,
                    Some(Stage::Validate.as_str()),
                    json!({"operation": "quarantine", "code": q.code(), "reason": q.to_string()}),
                );
            }
            let error = PipelineError::DegenerateBatch {
                accepted: report.accepted.len(),
                total,
                accepted_fraction,
                min_accept_ratio: self.settings.min_accept_ratio,
            };
            return Err(fail(scope, error));
        }

        match quarantined {
            Ok(()) => scope.complete(json!({
                "accepted": report.accepted.len(),
                "rejected": report.rejected.len(),
                "accepted_fraction": accepted_fraction,
            })),
            Err(error) => self.tolerate(run, scope, error)?,
        }
        Ok(report.accepted)
    }

    async fn compute_stats(
        &self,
        run: &mut PipelineRun,
        logger: &RunLogger,
        accepted: Vec<Record>,
    ) -> PipelineResult<(Vec<Record>, BatchStatistics)> {
        self.enter(run, Stage::Stats)?;
        let scope = StageScope::begin(logger, Stage::Stats.as_str());

        let contract = Arc::clone(&self.contract);
        let computed = tokio::task::spawn_blocking(move || {
            let stats = compute_batch_statistics(&accepted, &contract);
            (accepted, stats)
        })
        .await;

        match computed {
            Ok((accepted, stats)) => {
                scope.complete(json!({"fields": stats.len()}));
                Ok((accepted, stats))
            }
            Err(e) => Err(fail(scope, join_error(Stage::Stats, e))),
        }
    }

    async fn check_drift(
        &self,
        run: &mut PipelineRun,
        logger: &RunLogger,
        stats: BatchStatistics,
    ) -> PipelineResult<()> {
        self.enter(run, Stage::Drift)?;
        let scope = StageScope::begin(logger, Stage::Drift.as_str());

        let baseline = match self.baselines.get(&self.contract.schema_version) {
            Ok(baseline) => baseline,
            Err(e) if e.is_advisory() => {
                logger.log(
                    Level::Warn,
                    Event::DriftSkipped,
                    Some(Stage::Drift.as_str()),
                    json!({"code": e.code(), "reason": e.to_string()}),
                );
                run.summary.drift_skipped = Some(e.to_string());
                scope.skip(e.code(), &e.to_string());
                return Ok(());
            }
            Err(e) => return self.tolerate(run, scope, e.into()),
        };

        let monitor = self.monitor.clone();
        let thresholds = self.settings.drift_thresholds.clone();
        let report = match tokio::task::spawn_blocking(move || {
            monitor.check(&stats, &baseline, &thresholds)
        })
        .await
        {
            Ok(report) => report,
            Err(e) => return Err(fail(scope, join_error(Stage::Drift, e))),
        };

        let level = match report.overall_severity {
            DriftSeverity::None => Level::Info,
            DriftSeverity::Warning => Level::Warn,
            DriftSeverity::Critical => Level::Error,
        };
        logger.log(level, Event::DriftReport, Some(Stage::Drift.as_str()), json!(report));

        let entry = LedgerEntry::DriftReport {
            run_id: run.run_id,
            report: report.clone(),
        };
        if let Err(e) = self.ledger.append(&entry) {
            return Err(fail(scope, PipelineError::Ledger(e.to_string())));
        }

        let severity = report.overall_severity;
        let flagged = report.flagged().count();
        run.summary.drift = Some(report);

        if severity == DriftSeverity::Critical
            && self.settings.policies.get(Stage::Drift) == StageFailurePolicy::Abort
        {
            return Err(fail(scope, PipelineError::DriftGate(severity)));
        }

        scope.complete(json!({"overall_severity": severity.as_str(), "flagged": flagged}));
        Ok(())
    }

    async fn transform(
        &self,
        run: &mut PipelineRun,
        logger: &RunLogger,
        accepted: Vec<Record>,
    ) -> PipelineResult<Dataset> {
        self.enter(run, Stage::Transform)?;
        let scope = StageScope::begin(logger, Stage::Transform.as_str());

        let version = self.contract.schema_version.clone();
        let fallback = (self.settings.policies.get(Stage::Transform)
            == StageFailurePolicy::SkipAndContinue)
            .then(|| accepted.clone());

        let pipeline = Arc::clone(&self.transform);
        let worker_version = version.clone();
        let result =
            tokio::task::spawn_blocking(move || pipeline.run(&worker_version, accepted)).await;

        match result {
            Ok(Ok(dataset)) => {
                scope.complete(json!({"records": dataset.len()}));
                Ok(dataset)
            }
            Ok(Err(e)) => {
                self.tolerate(run, scope, e.into())?;
                // Skipped transform passes the accepted records through
                Ok(Dataset::new(version, fallback.unwrap_or_default()))
            }
            Err(e) => Err(fail(scope, join_error(Stage::Transform, e))),
        }
    }

    async fn persist(
        &self,
        run: &mut PipelineRun,
        logger: &RunLogger,
        dataset: Dataset,
    ) -> PipelineResult<()> {
        self.enter(run, Stage::Persist)?;
        let scope = StageScope::begin(logger, Stage::Persist.as_str());

        let run_id = run.run_id;
        let mut attempts = 0;
        let written = self
            .settings
            .retry
            .run(Stage::Persist, logger, &mut attempts, || {
                self.sink.write(&dataset, run_id)
            })
            .await;
        run.add_attempts(Stage::Persist, attempts);

        match written {
            Ok(()) => {
                run.summary.records_written = dataset.len();
                scope.complete(json!({"records": dataset.len(), "attempts": attempts}));
                Ok(())
            }
            Err(error) => self.tolerate(run, scope, error),
        }
    }
}

//! CLI command implementations
//!
//! Each command loads the configuration first; nothing is opened or
//! written before the configuration validates.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::baseline::{Baseline, BaselineStore, FileBaselineStore};
use crate::config::PipelineConfig;
use crate::contract::{load_contract_file, Contract, SchemaRegistry};
use crate::observability::{Event, JsonLinesSink, RunLogger};
use crate::pipeline::{
    FileRunLedger, FileSink, IngestionSource, InputWindow, Orchestrator, PipelineError,
    RunStatus,
};
use crate::record::parse_timestamp;
use crate::transform::TransformPipeline;
use crate::validation::{ContractValidator, ViolationCounters};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_report;

/// Dispatch a parsed command
pub async fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Run { config, start, end } => {
            run(&config, start.as_deref(), end.as_deref()).await
        }
        Command::Validate { config, input } => validate(&config, &input).await,
        Command::Recalibrate { config, input } => recalibrate(&config, &input).await,
        Command::Register { config, contract } => register(&config, &contract),
    }
}

fn load(config_path: &Path) -> CliResult<(PipelineConfig, RunLogger)> {
    let config = PipelineConfig::load(config_path)?;
    let logger = RunLogger::new(Arc::new(JsonLinesSink::stderr()));
    logger.info(
        Event::ConfigLoaded,
        json!({"path": config_path.display().to_string(), "schema_version": config.schema_version}),
    );
    Ok((config, logger))
}

fn resolve_contract(config: &PipelineConfig, logger: &RunLogger) -> CliResult<Arc<Contract>> {
    let registry = SchemaRegistry::open(&config.paths.contracts_dir)?;
    logger.info(Event::SchemasLoaded, json!({"versions": registry.versions()}));
    Ok(registry.get(&config.schema_version)?)
}

fn parse_bound(arg: &str, raw: Option<&str>) -> CliResult<Option<DateTime<Utc>>> {
    raw.map(|value| {
        parse_timestamp(value)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| CliError::invalid_argument(arg, format!("'{}' is not a date", value)))
    })
    .transpose()
}

/// Run the pipeline once.
pub async fn run(config_path: &Path, start: Option<&str>, end: Option<&str>) -> CliResult<()> {
    let (config, logger) = load(config_path)?;
    let window = InputWindow::new(parse_bound("--start", start)?, parse_bound("--end", end)?);
    if let (Some(s), Some(e)) = (window.start, window.end) {
        if s >= e {
            return Err(CliError::invalid_argument("--end", "must be after --start"));
        }
    }

    let contract = resolve_contract(&config, &logger)?;
    let baselines = FileBaselineStore::open(&config.paths.baseline_log)?;
    let ledger = FileRunLedger::open(&config.paths.run_ledger)
        .map_err(|e| PipelineError::Ledger(e.to_string()))?;
    let transform = match &config.transform {
        Some(t) => TransformPipeline::from_config(t).map_err(PipelineError::from)?,
        None => TransformPipeline::new(),
    };

    let orchestrator = Orchestrator::builder(
        contract,
        Arc::new(config.file_source()),
        Arc::new(FileSink::new(&config.paths.output_dir)),
    )
    .baselines(Arc::new(baselines))
    .ledger(Arc::new(ledger))
    .events(Arc::new(JsonLinesSink::stderr()))
    .transform(transform)
    .settings(config.orchestrator_settings())
    .build();

    let run = orchestrator.run(window).await;
    write_report(&run)?;

    match (run.status, &run.error) {
        (RunStatus::Failed, Some(error)) => Err(CliError::RunFailed {
            run_id: run.run_id.to_string(),
            code: error.code.clone(),
        }),
        _ => Ok(()),
    }
}

/// Validate a file without writing quarantine or dataset output.
pub async fn validate(config_path: &Path, input: &Path) -> CliResult<()> {
    let (config, logger) = load(config_path)?;
    let contract = resolve_contract(&config, &logger)?;
    let records = config
        .file_source_at(input)
        .fetch(&InputWindow::unbounded())
        .await?;

    let validator = ContractValidator::new(config.extra_field_policy);
    let counters = ViolationCounters::new();
    let report = validator.validate(records, &contract, &counters);

    let rejected: Vec<_> = report
        .rejected
        .iter()
        .map(|r| json!({"values": r.record.values, "violations": r.outcome.violations}))
        .collect();
    write_report(&json!({
        "schema_version": contract.schema_version,
        "total": report.total(),
        "accepted": report.accepted.len(),
        "rejected": report.rejected.len(),
        "accepted_fraction": report.accepted_fraction(),
        "meets_min_accept_ratio": report.accepted_fraction() >= config.min_accept_ratio,
        "violations": counters.snapshot(),
        "rejected_records": rejected,
    }))
}

/// Recompute the baseline from a trusted window.
pub async fn recalibrate(config_path: &Path, input: &Path) -> CliResult<()> {
    let (config, logger) = load(config_path)?;
    let contract = resolve_contract(&config, &logger)?;
    let records = config
        .file_source_at(input)
        .fetch(&InputWindow::unbounded())
        .await?;

    let offered = records.len();
    let baseline = Baseline::recalibrate(&contract, records, Utc::now())?;
    let summary = json!({
        "schema_version": baseline.schema_version,
        "sample_size": baseline.sample_size,
        "offered": offered,
        "fields": baseline.fields.keys().collect::<Vec<_>>(),
        "computed_at": baseline.computed_at,
    });

    let store = FileBaselineStore::open(&config.paths.baseline_log)?;
    store.put(baseline)?;
    logger.info(Event::BaselineRecalibrated, summary.clone());
    write_report(&summary)
}

/// Publish a contract to the registry directory.
pub fn register(config_path: &Path, contract_path: &Path) -> CliResult<()> {
    let (config, logger) = load(config_path)?;
    let contract = load_contract_file(contract_path)?;
    let version = contract.schema_version.clone();
    let fields = contract.fields.len();

    let registry = SchemaRegistry::open(&config.paths.contracts_dir)?;
    let path = registry.publish(contract)?;
    logger.info(
        Event::ContractRegistered,
        json!({"schema_version": version, "path": path.display().to_string()}),
    );
    write_report(&json!({
        "schema_version": version,
        "fields": fields,
        "path": path.display().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::FieldSpec;
    use crate::pipeline::{LedgerEntry, RunLedger};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn workspace(records: &str) -> (TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let contract = Contract::new(
            "vp-1",
            vec![
                FieldSpec::string("user_id"),
                FieldSpec::float("amount").with_range(0.0, 1_000.0),
            ],
        );
        fs::write(
            dir.path().join("contract.json"),
            serde_json::to_string(&contract).unwrap(),
        )
        .unwrap();
        fs::write(dir.path().join("in.jsonl"), records).unwrap();

        let config = dir.path().join("featuregate.json");
        fs::write(
            &config,
            r#"{
                "schema_version": "vp-1",
                "paths": { "contracts_dir": "contracts", "output_dir": "out" },
                "source": { "path": "in.jsonl" }
            }"#,
        )
        .unwrap();
        (dir, config)
    }

    const GOOD: &str = "{\"user_id\":\"u1\",\"amount\":10.0}\n{\"user_id\":\"u2\",\"amount\":12.5}\n";

    #[test]
    fn test_parse_bound() {
        let bound = parse_bound("--start", Some("1970-01-02")).unwrap().unwrap();
        assert_eq!(bound.timestamp(), 86_400);
        assert!(parse_bound("--start", None).unwrap().is_none());
        assert_eq!(
            parse_bound("--start", Some("yesterday")).unwrap_err().code(),
            "FG_CLI_INVALID_ARGUMENT"
        );
    }

    #[tokio::test]
    async fn test_run_without_contract_fails() {
        let (_dir, config) = workspace(GOOD);
        let err = run(&config, None, None).await.unwrap_err();
        assert_eq!(err.code(), "FG_SCHEMA_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_register_recalibrate_and_run() {
        let (dir, config) = workspace(GOOD);
        register(&config, &dir.path().join("contract.json")).unwrap();
        assert!(dir.path().join("contracts/contract_vp-1.json").exists());

        recalibrate(&config, &dir.path().join("in.jsonl")).await.unwrap();
        run(&config, None, None).await.unwrap();

        let ledger = FileRunLedger::open(dir.path().join("runs.jsonl")).unwrap();
        let runs = ledger.runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Succeeded);
        assert!(ledger
            .entries()
            .unwrap()
            .iter()
            .any(|e| matches!(e, LedgerEntry::DriftReport { .. })));

        let dataset = dir
            .path()
            .join("out")
            .join(runs[0].run_id.to_string())
            .join("dataset.jsonl");
        assert_eq!(fs::read_to_string(dataset).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn test_degenerate_run_reports_failure() {
        let (dir, config) = workspace("{\"user_id\":\"u1\",\"amount\":-1.0}\n");
        register(&config, &dir.path().join("contract.json")).unwrap();

        let err = run(&config, None, None).await.unwrap_err();
        assert_eq!(err.code(), "FG_CLI_RUN_FAILED");
        assert!(err.to_string().contains("FG_DEGENERATE_BATCH"));
    }
}

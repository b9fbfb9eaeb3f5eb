//! Pipeline run model
//!
//! A run walks the stages in order, never backwards:
//!
//! ```text
//! ingest -> validate -> stats -> drift -> transform -> persist -> done
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::PipelineError;
use crate::drift::BatchDriftReport;
use crate::validation::CountersSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Validate,
    Stats,
    Drift,
    Transform,
    Persist,
    Done,
}

impl Stage {
    /// Working stages in execution order (`Done` excluded).
    pub const WORKING: [Stage; 6] = [
        Stage::Ingest,
        Stage::Validate,
        Stage::Stats,
        Stage::Drift,
        Stage::Transform,
        Stage::Persist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Validate => "validate",
            Stage::Stats => "stats",
            Stage::Drift => "drift",
            Stage::Transform => "transform",
            Stage::Persist => "persist",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingest" => Ok(Stage::Ingest),
            "validate" => Ok(Stage::Validate),
            "stats" => Ok(Stage::Stats),
            "drift" => Ok(Stage::Drift),
            "transform" => Ok(Stage::Transform),
            "persist" => Ok(Stage::Persist),
            "done" => Ok(Stage::Done),
            other => Err(format!("unknown stage '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    PartiallySucceeded,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::PartiallySucceeded => "partially_succeeded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::PartiallySucceeded
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open time range `[start, end)` handed to the ingestion source.
///
/// An absent bound is unbounded on that side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl InputWindow {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Whether a Unix-seconds timestamp falls inside the window.
    pub fn contains_seconds(&self, ts: i64) -> bool {
        self.start.map_or(true, |s| ts >= s.timestamp())
            && self.end.map_or(true, |e| ts < e.timestamp())
    }
}

/// Terminal error of a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub stage: Stage,
    pub code: String,
    pub message: String,
}

impl RunError {
    pub fn from_error(stage: Stage, error: &PipelineError) -> Self {
        Self {
            stage,
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// A stage error tolerated by a skip-and-continue policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSkip {
    pub stage: Stage,
    pub code: String,
    pub reason: String,
}

/// Diagnostics accumulated while the run progresses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub records_ingested: usize,
    pub records_accepted: usize,
    pub records_rejected: usize,
    pub records_written: usize,
    #[serde(default)]
    pub violations: Option<CountersSnapshot>,
    #[serde(default)]
    pub drift: Option<BatchDriftReport>,
    /// Why drift was not evaluated (no baseline), if it was not
    #[serde(default)]
    pub drift_skipped: Option<String>,
    #[serde(default)]
    pub skipped_stages: Vec<StageSkip>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub schema_version: String,
    pub input_window: InputWindow,
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// Attempts per retried stage
    pub attempts: BTreeMap<Stage, u32>,
    pub error: Option<RunError>,
    pub summary: RunSummary,
}

impl PipelineRun {
    pub fn new(schema_version: impl Into<String>, input_window: InputWindow) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            schema_version: schema_version.into(),
            input_window,
            stage: Stage::Ingest,
            started_at: Utc::now(),
            ended_at: None,
            status: RunStatus::Pending,
            attempts: BTreeMap::new(),
            error: None,
            summary: RunSummary::default(),
        }
    }

    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Utc::now();
    }

    /// Moves to `stage`. Backward moves are refused.
    pub fn advance(&mut self, stage: Stage) -> Result<(), PipelineError> {
        if stage < self.stage {
            return Err(PipelineError::Internal(format!(
                "illegal stage transition {} -> {}",
                self.stage, stage
            )));
        }
        self.stage = stage;
        Ok(())
    }

    pub fn add_attempts(&mut self, stage: Stage, attempts: u32) {
        *self.attempts.entry(stage).or_insert(0) += attempts;
    }

    /// Terminal status for a run that reached `done`.
    pub fn success_status(&self) -> RunStatus {
        if self.summary.records_rejected > 0 || !self.summary.skipped_stages.is_empty() {
            RunStatus::PartiallySucceeded
        } else {
            RunStatus::Succeeded
        }
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &PipelineError) {
        self.error = Some(RunError::from_error(self.stage, error));
        self.finish(RunStatus::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stage_order_is_linear() {
        let mut stages = Stage::WORKING.to_vec();
        stages.push(Stage::Done);
        assert!(stages.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_no_backward_transition() {
        let mut run = PipelineRun::new("v1", InputWindow::unbounded());
        run.advance(Stage::Stats).unwrap();
        assert!(run.advance(Stage::Validate).is_err());
        assert_eq!(run.stage, Stage::Stats);
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!("drift".parse::<Stage>(), Ok(Stage::Drift));
        assert!("publish".parse::<Stage>().is_err());
    }

    #[test]
    fn test_success_status() {
        let mut run = PipelineRun::new("v1", InputWindow::unbounded());
        assert_eq!(run.success_status(), RunStatus::Succeeded);
        run.summary.records_rejected = 1;
        assert_eq!(run.success_status(), RunStatus::PartiallySucceeded);
    }

    #[test]
    fn test_fail_records_stage() {
        let mut run = PipelineRun::new("v1", InputWindow::unbounded());
        run.start();
        run.advance(Stage::Persist).unwrap();
        run.fail(&PipelineError::Cancelled(Stage::Persist));
        assert_eq!(run.status, RunStatus::Failed);
        let err = run.error.as_ref().unwrap();
        assert_eq!(err.stage, Stage::Persist);
        assert_eq!(err.code, "FG_CANCELLED");
        assert!(run.ended_at.is_some());
    }

    #[test]
    fn test_window_is_half_open() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let w = InputWindow::new(Some(start), Some(end));
        assert!(w.contains_seconds(start.timestamp()));
        assert!(!w.contains_seconds(end.timestamp()));
        assert!(InputWindow::unbounded().contains_seconds(i64::MIN));
    }

    #[test]
    fn test_run_serde_roundtrip_keeps_attempts() {
        let mut run = PipelineRun::new("v1", InputWindow::unbounded());
        run.add_attempts(Stage::Ingest, 2);
        let json = serde_json::to_string(&run).unwrap();
        assert!(json.contains("\"ingest\":2"));
        let back: PipelineRun = serde_json::from_str(&json).unwrap();
        assert_eq!(back, run);
    }
}

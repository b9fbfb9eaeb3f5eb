//! Per-stage failure policy

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::run::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageFailurePolicy {
    /// Stage error fails the run
    Abort,
    /// Stage error is reported as a warning and the run goes on
    SkipAndContinue,
}

impl StageFailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageFailurePolicy::Abort => "abort",
            StageFailurePolicy::SkipAndContinue => "skip-and-continue",
        }
    }
}

/// Policy per stage. Drift is advisory by default; everything else aborts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePolicies {
    overrides: BTreeMap<Stage, StageFailurePolicy>,
}

impl Default for StagePolicies {
    fn default() -> Self {
        let mut overrides = BTreeMap::new();
        overrides.insert(Stage::Drift, StageFailurePolicy::SkipAndContinue);
        Self { overrides }
    }
}

impl StagePolicies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with the given per-stage overrides applied.
    pub fn with_overrides(overrides: &BTreeMap<Stage, StageFailurePolicy>) -> Self {
        let mut policies = Self::default();
        for (stage, policy) in overrides {
            policies.set(*stage, *policy);
        }
        policies
    }

    pub fn set(&mut self, stage: Stage, policy: StageFailurePolicy) {
        self.overrides.insert(stage, policy);
    }

    pub fn get(&self, stage: Stage) -> StageFailurePolicy {
        self.overrides
            .get(&stage)
            .copied()
            .unwrap_or(StageFailurePolicy::Abort)
    }
}

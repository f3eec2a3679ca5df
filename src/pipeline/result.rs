//! Stage and run results
//!
//! [`RunResult::from_stage_results`] is the only place the run verdict is
//! computed: a run passes iff every one of its stages passed.

#![allow(clippy::must_use_candidate)]

use super::types::StageOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Outcome of one stage within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// Name of the originating stage
    pub stage: String,

    /// Pass, or fail with a cause
    pub outcome: StageOutcome,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// When the stage started (toolchain resolution included)
    pub started_at: DateTime<Utc>,

    /// When the stage finished
    pub finished_at: DateTime<Utc>,
}

impl StageResult {
    /// Returns true if the stage passed
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Wall-clock time spent in the stage
    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Returns true if the stage produced no output at all
    pub fn is_silent(&self) -> bool {
        self.stdout.trim().is_empty() && self.stderr.trim().is_empty()
    }
}

/// Aggregate of every stage result of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Id of the run that produced these results
    pub run_id: Uuid,

    /// Revision that was checked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    /// True iff every stage passed
    pub success: bool,

    /// One result per configured stage, in configuration order
    pub stages: Vec<StageResult>,

    /// When execution began
    pub started_at: DateTime<Utc>,

    /// When the last stage finished
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    /// Folds stage results into a run verdict
    pub fn from_stage_results(
        run_id: Uuid,
        revision: Option<String>,
        stages: Vec<StageResult>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let success = stages.iter().all(StageResult::is_success);
        Self {
            run_id,
            revision,
            success,
            stages,
            started_at,
            finished_at,
        }
    }

    /// Returns true if every stage passed
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Every failing stage, in configuration order
    pub fn failures(&self) -> impl Iterator<Item = &StageResult> {
        self.stages.iter().filter(|s| !s.is_success())
    }

    /// Names of every failing stage
    pub fn failing_stages(&self) -> Vec<&str> {
        self.failures().map(|s| s.stage.as_str()).collect()
    }

    /// Number of passing stages
    pub fn passed_count(&self) -> usize {
        self.stages.iter().filter(|s| s.is_success()).count()
    }

    /// Looks up a stage result by name
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Wall-clock time of the whole run
    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

//! Run execution traits
//!
//! This module defines the interface every run executor provides.

use crate::pipeline::{Environment, OrchestratorError, Run, RunResult};
use async_trait::async_trait;
use serde::Serialize;

/// Trait for executing runs
#[async_trait]
pub trait RunExecutor: Send + Sync {
    /// Executes every stage of `run` and aggregates the results
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Cancelled`] if the run was interrupted.
    async fn execute(&self, run: &Run) -> Result<RunResult, OrchestratorError>;

    /// Describes what `execute` would launch, without side effects
    fn dry_run(&self, run: &Run) -> Vec<StagePlan>;
}

/// What a stage would launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagePlan {
    /// Stage name
    pub stage: String,

    /// Program and arguments after variable expansion
    pub argv: Vec<String>,

    /// Toolchain resolved at execution time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<String>,

    /// Effective environment: ambient, then the toolchain's activation as
    /// far as it is known without probing, then the stage's overrides
    pub env: Environment,
}

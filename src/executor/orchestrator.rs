//! Check orchestrator
//!
//! Fans a run out into one task per stage and folds the results back in.
//!
//! - Every stage runs to completion. A failing stage never stops another.
//! - Toolchain and spawn errors are recorded on the stage they belong to.
//! - Cancellation aborts every in-flight stage and waits for the aborts to
//!   land, so no child process outlives [`Orchestrator::execute_until`].
//! - Results come back in configuration order regardless of completion
//!   order.

use super::shell::{LaunchConfig, StageCommand, expand_variables};
use super::toolchain::{ResolveContext, ToolchainRegistry, ToolchainResolver};
use super::traits::{RunExecutor, StagePlan};
use crate::pipeline::{
    Environment, FailureCause, OrchestratorError, Run, RunResult, Stage, StageOutcome,
    StageResult,
};
use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Configuration for the orchestrator
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Maximum stages in flight; `None` runs every stage at once
    pub max_parallel: Option<usize>,

    /// How stage processes are launched
    pub launch: LaunchConfig,
}

impl OrchestratorConfig {
    /// One stage at a time
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            max_parallel: Some(1),
            ..Self::default()
        }
    }
}

/// Runs configured stages and aggregates their outcomes
#[derive(Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    toolchains: Arc<dyn ToolchainResolver>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator that knows no toolchains
    #[must_use]
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            toolchains: Arc::new(ToolchainRegistry::new()),
        }
    }

    /// Sets the toolchain resolver
    #[must_use]
    pub fn with_toolchains(mut self, resolver: impl ToolchainResolver + 'static) -> Self {
        self.toolchains = Arc::new(resolver);
        self
    }

    /// Current configuration
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Executes `run`, aborting when `cancel` completes first
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Cancelled`] if `cancel` resolves before
    /// every stage has finished. No partial result is returned and every
    /// child process has been killed by the time this returns.
    pub async fn execute_until<F>(
        &self,
        run: &Run,
        cancel: F,
    ) -> Result<RunResult, OrchestratorError>
    where
        F: Future<Output = ()>,
    {
        let stage_count = run.stages().len();
        let limit = self.config.max_parallel.unwrap_or(stage_count).max(1);
        let permits = Arc::new(Semaphore::new(limit));
        let started_at = Utc::now();

        tracing::info!(
            run_id = %run.id(),
            revision = run.revision().unwrap_or("-"),
            stages = stage_count,
            max_parallel = limit,
            "Starting run"
        );

        let mut tasks = JoinSet::new();
        for (index, stage) in run.stages().iter().enumerate() {
            let job = StageJob {
                stage: stage.clone(),
                context: ResolveContext {
                    ambient: run.ambient().clone(),
                    launch: self.config.launch.clone(),
                    workdir: run.workdir().map(PathBuf::from),
                },
                toolchains: Arc::clone(&self.toolchains),
                permits: Arc::clone(&permits),
            };
            tasks.spawn(async move { (index, job.run().await) });
        }

        let mut slots: Vec<Option<StageResult>> = vec![None; stage_count];
        tokio::pin!(cancel);

        loop {
            tokio::select! {
                () = &mut cancel => {
                    tracing::warn!(run_id = %run.id(), in_flight = tasks.len(), "Run cancelled, stopping stages");
                    tasks.shutdown().await;
                    return Err(OrchestratorError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok((index, result))) => slots[index] = Some(result),
                    Some(Err(e)) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                    Some(Err(_)) => return Err(OrchestratorError::Cancelled),
                    None => break,
                },
            }
        }

        let stages: Vec<StageResult> = slots.into_iter().flatten().collect();
        let result = RunResult::from_stage_results(
            run.id(),
            run.revision().map(String::from),
            stages,
            started_at,
            Utc::now(),
        );

        tracing::info!(
            run_id = %run.id(),
            success = result.is_success(),
            passed = result.passed_count(),
            failed = ?result.failing_stages(),
            duration_ms = result.duration().as_millis(),
            "Run completed"
        );

        Ok(result)
    }

    /// Executes `run`, treating expiry of `deadline` as cancellation
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Cancelled`] if the deadline expires.
    pub async fn execute_with_deadline(
        &self,
        run: &Run,
        deadline: Duration,
    ) -> Result<RunResult, OrchestratorError> {
        self.execute_until(run, tokio::time::sleep(deadline)).await
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

#[async_trait]
impl RunExecutor for Orchestrator {
    async fn execute(&self, run: &Run) -> Result<RunResult, OrchestratorError> {
        self.execute_until(run, std::future::pending()).await
    }

    fn dry_run(&self, run: &Run) -> Vec<StagePlan> {
        run.stages()
            .iter()
            .map(|stage| {
                let toolchain_env = stage
                    .toolchain
                    .as_deref()
                    .and_then(|selector| self.toolchains.preview(selector))
                    .map(|toolchain| toolchain.env)
                    .unwrap_or_default();
                let env = run.ambient().overlay(&toolchain_env).overlay(&stage.env);
                StagePlan {
                    stage: stage.name.clone(),
                    argv: stage
                        .command
                        .iter()
                        .map(|arg| expand_variables(arg, &env))
                        .collect(),
                    toolchain: stage.toolchain.clone(),
                    env,
                }
            })
            .collect()
    }
}

/// Everything one stage task owns
struct StageJob {
    stage: Stage,
    context: ResolveContext,
    toolchains: Arc<dyn ToolchainResolver>,
    permits: Arc<Semaphore>,
}

impl StageJob {
    async fn run(self) -> StageResult {
        // The semaphore is never closed.
        let _permit = self.permits.acquire().await.ok();
        let started_at = Utc::now();
        let name = self.stage.name.as_str();

        tracing::info!(stage = %name, "Stage started");

        let toolchain_env = match self.stage.toolchain {
            Some(ref selector) => match self.toolchains.resolve(selector, &self.context).await {
                Ok(toolchain) => toolchain.env,
                Err(error) => {
                    tracing::warn!(stage = %name, toolchain = %selector, %error, "Toolchain unavailable");
                    return self.finish(
                        StageOutcome::Failure(FailureCause::Toolchain { error }),
                        String::new(),
                        String::new(),
                        started_at,
                    );
                }
            },
            None => Environment::new(),
        };

        // Stage overrides win over the toolchain, which wins over ambient.
        let env = self
            .context
            .ambient
            .overlay(&toolchain_env)
            .overlay(&self.stage.env);

        let command = StageCommand::new(name, &self.stage.command, &env, &self.context.launch)
            .current_dir(self.context.workdir.as_deref());

        match command.output().await {
            Ok(output) => self.finish(
                StageOutcome::from_exit_status(output.status),
                output.stdout,
                output.stderr,
                started_at,
            ),
            Err(error) => {
                tracing::warn!(stage = %name, %error, "Stage command could not be launched");
                self.finish(
                    StageOutcome::Failure(FailureCause::Spawn { error }),
                    String::new(),
                    String::new(),
                    started_at,
                )
            }
        }
    }

    fn finish(
        &self,
        outcome: StageOutcome,
        stdout: String,
        stderr: String,
        started_at: chrono::DateTime<Utc>,
    ) -> StageResult {
        let result = StageResult {
            stage: self.stage.name.clone(),
            outcome,
            stdout,
            stderr,
            started_at,
            finished_at: Utc::now(),
        };

        match result.outcome.cause() {
            None => tracing::info!(
                stage = %result.stage,
                duration_ms = result.duration().as_millis(),
                "Stage passed"
            ),
            Some(cause) => tracing::warn!(
                stage = %result.stage,
                %cause,
                duration_ms = result.duration().as_millis(),
                "Stage failed"
            ),
        }

        result
    }
}

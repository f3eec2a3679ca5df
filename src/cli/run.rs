//! `checkline run` - Execute every configured stage
//!
//! Stages run concurrently unless `--sequential` or `--jobs` says
//! otherwise. The report goes to stdout once every stage has finished.
//! Ctrl-C, SIGTERM, SIGHUP or an expired `--deadline` cancels the run: every
//! stage process group is killed and no report is printed.
//!
//! ## Usage
//!
//! ```bash
//! checkline run -c checks.yml --revision "$(git rev-parse --short HEAD)"
//! checkline run --stage test --env DEV_MODE=1 --format json
//! ```

use super::Status;
use super::validate::load_run;
use anyhow::{Context, Result};
use checkline::{Orchestrator, OrchestratorError, ReportFormat, render};
use std::path::PathBuf;
use std::time::Duration;
#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Options for a single `checkline run`
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub source: super::SourceArgs,
    pub max_parallel: Option<usize>,
    pub revision: Option<String>,
    pub workdir: Option<PathBuf>,
    pub deadline: Option<Duration>,
    pub format: ReportFormat,
    pub stream: bool,
}

/// Loads, executes, and reports a run
pub fn run_checks(options: &RunOptions) -> Result<Status> {
    let (config, mut run) = load_run(&options.source)?;
    if let Some(ref revision) = options.revision {
        run = run.with_revision(revision.clone());
    }
    if let Some(ref workdir) = options.workdir {
        run = run.with_workdir(workdir.clone());
    }

    let mut orchestrator_config = config.orchestrator();
    if options.max_parallel.is_some() {
        orchestrator_config.max_parallel = options.max_parallel;
    }
    orchestrator_config.launch.streaming = options.stream;
    let orchestrator = Orchestrator::new(orchestrator_config).with_toolchains(config.toolchains()?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let deadline = options.deadline;
    let result = runtime.block_on(async {
        let mut interrupts =
            Interrupts::install().context("Failed to install signal handlers")?;
        anyhow::Ok(
            orchestrator
                .execute_until(&run, cancelled(&mut interrupts, deadline))
                .await,
        )
    })?;

    let result = match result {
        Ok(result) => result,
        Err(OrchestratorError::Cancelled) => {
            eprintln!("Run {} cancelled", run.id());
            return Err(OrchestratorError::Cancelled.into());
        }
        Err(e) => return Err(e.into()),
    };

    let output = render(&result, options.format).context("Failed to render report")?;
    print!("{output}");

    Ok(if result.is_success() {
        Status::Passed
    } else {
        Status::Failed
    })
}

/// Resolves on an interrupt or when `deadline` elapses, whichever comes first
async fn cancelled(interrupts: &mut Interrupts, deadline: Option<Duration>) {
    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep(deadline).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        signal = interrupts.recv() => tracing::warn!(signal, "Interrupted"),
        () = expired => tracing::warn!(?deadline, "Deadline expired"),
    }
}

/// Signals that stop a run: SIGINT, SIGTERM and SIGHUP on unix, Ctrl-C
/// elsewhere
///
/// Listeners are registered on install, so a signal arriving before
/// [`recv`](Self::recv) is polled is not lost.
#[cfg(unix)]
struct Interrupts {
    interrupt: Signal,
    terminate: Signal,
    hangup: Signal,
}

#[cfg(unix)]
impl Interrupts {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            Some(()) = self.interrupt.recv() => "SIGINT",
            Some(()) = self.terminate.recv() => "SIGTERM",
            Some(()) = self.hangup.recv() => "SIGHUP",
            else => std::future::pending().await,
        }
    }
}

#[cfg(not(unix))]
struct Interrupts;

#[cfg(not(unix))]
impl Interrupts {
    #[allow(clippy::unnecessary_wraps)]
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        "Ctrl-C"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{EXIT_CANCELLED, SourceArgs, exit_code_for};
    use tempfile::TempDir;

    fn options(dir: &TempDir, content: &str) -> RunOptions {
        let path = dir.path().join("checkline.yml");
        std::fs::write(&path, content).unwrap();
        RunOptions {
            source: SourceArgs {
                config: path,
                stages: Vec::new(),
                env: Vec::new(),
            },
            max_parallel: None,
            revision: Some("3f2c1ab".to_string()),
            workdir: Some(dir.path().to_path_buf()),
            deadline: None,
            format: ReportFormat::Text,
            stream: false,
        }
    }

    #[test]
    fn test_run_checks_passing() {
        let dir = TempDir::new().unwrap();
        let options = options(
            &dir,
            "stages:\n  - {name: ok, command: [sh, -c, 'exit 0']}\n",
        );
        assert_eq!(run_checks(&options).unwrap(), Status::Passed);
    }

    #[test]
    fn test_run_checks_failing() {
        let dir = TempDir::new().unwrap();
        let options = options(
            &dir,
            "stages:\n  - {name: ok, command: [sh, -c, 'exit 0']}\n  - {name: bad, command: [sh, -c, 'exit 1']}\n",
        );
        assert_eq!(run_checks(&options).unwrap(), Status::Failed);
    }

    #[test]
    fn test_run_checks_deadline_cancels() {
        let dir = TempDir::new().unwrap();
        let mut options = options(
            &dir,
            "stages:\n  - {name: slow, command: [sleep, '30']}\n",
        );
        options.deadline = Some(Duration::from_millis(200));

        let err = run_checks(&options).unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_CANCELLED);
    }
}

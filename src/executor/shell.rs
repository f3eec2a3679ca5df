//! Child process launching for stages
//!
//! Every stage command is spawned directly (no intermediate shell) with:
//!
//! - its effective environment layered over the orchestrator's own
//!   environment, or replacing it when `inherit_env` is off
//! - stdin closed, stdout and stderr captured
//! - on unix, its own process group, killed as a whole once the stage ends
//!   or the launch future is dropped, so nothing the command started
//!   outlives it
//!
//! ## Variable Expansion
//!
//! Arguments may reference the effective environment with `${VAR_NAME}`:
//!
//! ```rust
//! use checkline::{Environment, expand_variables};
//!
//! let env = Environment::new().set("TARGET", "x86_64-unknown-linux-gnu");
//! let expanded = expand_variables("--target=${TARGET}", &env);
//! assert_eq!(expanded, "--target=x86_64-unknown-linux-gnu");
//! ```

use crate::pipeline::{Environment, ProcessSpawnError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// How stage processes are launched
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Children start from the orchestrator's own environment
    pub inherit_env: bool,

    /// Echo output lines to stderr as they arrive
    pub streaming: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            inherit_env: true,
            streaming: false,
        }
    }
}

/// Exit status and captured output of a finished child
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit status
    pub status: ExitStatus,

    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,
}

/// A single child process invocation
#[derive(Debug, Clone)]
pub struct StageCommand<'a> {
    label: &'a str,
    command: Vec<String>,
    env: &'a Environment,
    cwd: Option<&'a Path>,
    config: &'a LaunchConfig,
}

impl<'a> StageCommand<'a> {
    /// Creates a command; `command[0]` is the program
    ///
    /// Every element is expanded against `env` first.
    #[must_use]
    pub fn new(
        label: &'a str,
        command: &[String],
        env: &'a Environment,
        config: &'a LaunchConfig,
    ) -> Self {
        Self {
            label,
            command: command.iter().map(|a| expand_variables(a, env)).collect(),
            env,
            cwd: None,
            config,
        }
    }

    /// Runs the child from `dir`
    #[must_use]
    pub fn current_dir(mut self, dir: Option<&'a Path>) -> Self {
        self.cwd = dir;
        self
    }

    /// Expanded program and arguments
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.command
    }

    /// Spawns the child and waits for it, capturing its output
    ///
    /// # Errors
    ///
    /// Returns [`ProcessSpawnError`] if the program cannot be launched or
    /// its output cannot be collected. A non-zero exit is not an error.
    pub async fn output(&self) -> Result<ProcessOutput, ProcessSpawnError> {
        let program = self.command.first().cloned().unwrap_or_default();
        let spawn_error = |e: io::Error| ProcessSpawnError {
            program: program.clone(),
            reason: e.to_string(),
        };

        let mut cmd = Command::new(&program);
        cmd.args(self.command.get(1..).unwrap_or_default());
        if !self.config.inherit_env {
            cmd.env_clear();
        }
        cmd.envs(self.env.iter());
        if let Some(cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        tracing::debug!(
            stage = %self.label,
            command = %shell_words::join(&self.command),
            env_keys = ?self.env.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            "Spawning stage command"
        );

        let child = cmd.spawn().map_err(spawn_error)?;
        let _group = ProcessGroup::led_by(&child);

        if self.config.streaming {
            self.stream(child).await.map_err(spawn_error)
        } else {
            let output = child.wait_with_output().await.map_err(spawn_error)?;
            Ok(ProcessOutput {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }

    /// Waits for the child while echoing each line with the stage label
    async fn stream(&self, mut child: Child) -> io::Result<ProcessOutput> {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (stdout, stderr, status) = tokio::join!(
            pump_lines(stdout, self.label),
            pump_lines(stderr, self.label),
            child.wait(),
        );

        Ok(ProcessOutput {
            status: status?,
            stdout: stdout?,
            stderr: stderr?,
        })
    }
}

/// Kills a child's whole process group when dropped
///
/// The child leads its own group, so this reaches every process it started
/// that did not move to another group or session.
struct ProcessGroup {
    #[cfg(unix)]
    id: Option<libc::pid_t>,
}

impl ProcessGroup {
    #[cfg(unix)]
    fn led_by(child: &Child) -> Self {
        Self {
            id: child.id().and_then(|id| libc::pid_t::try_from(id).ok()),
        }
    }

    #[cfg(not(unix))]
    fn led_by(_child: &Child) -> Self {
        Self {}
    }
}

impl Drop for ProcessGroup {
    #[cfg(unix)]
    fn drop(&mut self) {
        if let Some(id) = self.id {
            // SAFETY: killpg only sends a signal; an empty group yields ESRCH.
            if unsafe { libc::killpg(id, libc::SIGKILL) } == 0 {
                tracing::debug!(pgid = id, "Killed stage process group");
            }
        }
    }

    #[cfg(not(unix))]
    fn drop(&mut self) {}
}

async fn pump_lines<R: AsyncRead + Unpin>(reader: Option<R>, label: &str) -> io::Result<String> {
    let Some(reader) = reader else {
        return Ok(String::new());
    };

    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        eprintln!("[{label}] {}", line.trim_end_matches(['\r', '\n']));
        captured.push_str(&line);
    }
    Ok(captured)
}

/// Expands `${VAR}` references in a string
///
/// Unknown variables are left untouched.
///
/// # Example
///
/// ```rust
/// use checkline::{Environment, expand_variables};
///
/// let env = Environment::new().set("PROFILE", "ci");
/// assert_eq!(expand_variables("--profile ${PROFILE}", &env), "--profile ci");
/// assert_eq!(expand_variables("${MISSING}", &env), "${MISSING}");
/// ```
#[must_use]
pub fn expand_variables(input: &str, env: &Environment) -> String {
    static VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("variable pattern is valid")
    });

    VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = caps.get(1).map_or("", |m| m.as_str());
            match env.get(var_name) {
                Some(value) => value.clone(),
                None => caps
                    .get(0)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            }
        })
        .to_string()
}

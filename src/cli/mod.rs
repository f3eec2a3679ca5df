//! CLI for checkline
//!
//! - `run`: execute every configured stage and report
//! - `validate`: check the stage configuration without running anything
//! - `plan`: show what `run` would launch
//! - `completions`: generate shell completions
//!
//! ## Exit codes
//!
//! | code | meaning |
//! |------|---------|
//! | 0    | every stage passed (or `validate`/`plan` succeeded) |
//! | 1    | the run completed and at least one stage failed |
//! | 2    | configuration error |
//! | 3    | internal error |
//! | 130  | run cancelled by Ctrl-C, SIGTERM, SIGHUP or `--deadline` |

pub mod completions;
pub mod run;
pub mod validate;

use anyhow::Result;
use checkline::{ConfigError, DEFAULT_CHECK_FILE, OrchestratorError};
use clap::{Args as ClapArgs, CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

/// Every stage passed
pub const EXIT_SUCCESS: u8 = 0;
/// At least one stage failed
pub const EXIT_STAGE_FAILURE: u8 = 1;
/// Configuration could not be loaded or validated
pub const EXIT_CONFIG_ERROR: u8 = 2;
/// Anything else went wrong
pub const EXIT_INTERNAL_ERROR: u8 = 3;
/// The run was interrupted
pub const EXIT_CANCELLED: u8 = 130;

/// CLI arguments for checkline
#[derive(Parser, Debug)]
#[command(name = "checkline")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Default log level (overridden by CHECKLINE_LOG)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every configured stage
    Run {
        #[command(flatten)]
        source: SourceArgs,
        /// Run one stage at a time
        #[arg(long, conflicts_with = "jobs")]
        sequential: bool,
        /// Maximum stages in flight
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Revision being checked, shown in the report
        #[arg(long)]
        revision: Option<String>,
        /// Working directory for every stage
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// Cancel the run after this many seconds
        #[arg(long)]
        deadline: Option<u64>,
        /// Report format
        #[arg(short, long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,
        /// Echo stage output live to stderr
        #[arg(long)]
        stream: bool,
    },

    /// Validate the stage configuration
    Validate {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Show what `run` would launch
    Plan {
        #[command(flatten)]
        source: SourceArgs,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Where stages come from
#[derive(ClapArgs, Debug, Clone)]
pub struct SourceArgs {
    /// Check file
    #[arg(short, long, default_value = DEFAULT_CHECK_FILE)]
    pub config: PathBuf,
    /// Only these stages (repeatable)
    #[arg(short, long = "stage")]
    pub stages: Vec<String>,
    /// Extra ambient variable KEY=VALUE (repeatable)
    #[arg(short, long = "env", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for checkline::ReportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    Args::command()
}

/// How a successful invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Everything passed
    Passed,
    /// The run finished with failing stages
    Failed,
}

impl Status {
    /// Process exit code for this status
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Passed => ExitCode::from(EXIT_SUCCESS),
            Self::Failed => ExitCode::from(EXIT_STAGE_FAILURE),
        }
    }
}

/// Maps an error to its documented exit code
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_CONFIG_ERROR;
    }
    match err.downcast_ref::<OrchestratorError>() {
        Some(OrchestratorError::Config(_)) => EXIT_CONFIG_ERROR,
        Some(OrchestratorError::Cancelled) => EXIT_CANCELLED,
        None => EXIT_INTERNAL_ERROR,
    }
}

/// Parse and execute CLI arguments
pub fn run(args: Args) -> Result<Status> {
    match args.command {
        Command::Run {
            source,
            sequential,
            jobs,
            revision,
            workdir,
            deadline,
            format,
            stream,
        } => {
            let options = run::RunOptions {
                source,
                max_parallel: if sequential { Some(1) } else { jobs },
                revision,
                workdir,
                deadline: deadline.map(std::time::Duration::from_secs),
                format: format.into(),
                stream,
            };
            run::run_checks(&options)
        }
        Command::Validate { source } => {
            validate::validate(&source)?;
            Ok(Status::Passed)
        }
        Command::Plan { source, format } => {
            let output = validate::plan(&source, format.into())?;
            println!("{output}");
            Ok(Status::Passed)
        }
        Command::Completions { shell, output } => {
            use clap_complete::Shell;

            let shell_enum = match shell {
                ShellArg::Bash => Shell::Bash,
                ShellArg::Zsh => Shell::Zsh,
                ShellArg::Fish => Shell::Fish,
                ShellArg::PowerShell => Shell::PowerShell,
            };

            let completions = completions::generate_completions(shell_enum)?;

            if let Some(output_path) = output {
                completions::save_completions(&completions, &output_path)?;
            } else {
                println!("{completions}");
            }
            Ok(Status::Passed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("LOG_LEVEL=trace"),
            Ok(("LOG_LEVEL".to_string(), "trace".to_string()))
        );
        assert_eq!(
            parse_key_val("EMPTY="),
            Ok(("EMPTY".to_string(), String::new()))
        );
        assert_eq!(
            parse_key_val("A=b=c"),
            Ok(("A".to_string(), "b=c".to_string()))
        );
        assert!(parse_key_val("NOVALUE").is_err());
        assert!(parse_key_val("=value").is_err());
    }

    #[test]
    fn test_parse_run_arguments() {
        let args = Args::try_parse_from([
            "checkline",
            "run",
            "-c",
            "ci.yml",
            "--stage",
            "test",
            "-e",
            "DEV_MODE=1",
            "--jobs",
            "2",
            "--format",
            "json",
        ])
        .unwrap();

        match args.command {
            Command::Run {
                source,
                jobs,
                format,
                sequential,
                ..
            } => {
                assert_eq!(source.config, PathBuf::from("ci.yml"));
                assert_eq!(source.stages, ["test"]);
                assert_eq!(source.env, [("DEV_MODE".to_string(), "1".to_string())]);
                assert_eq!(jobs, Some(2));
                assert_eq!(format, FormatArg::Json);
                assert!(!sequential);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_sequential_conflicts_with_jobs() {
        let result = Args::try_parse_from(["checkline", "run", "--sequential", "--jobs", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_exit_codes() {
        let config = anyhow::Error::new(ConfigError::NoStages).context("loading checks");
        assert_eq!(exit_code_for(&config), EXIT_CONFIG_ERROR);

        let cancelled = anyhow::Error::new(OrchestratorError::Cancelled);
        assert_eq!(exit_code_for(&cancelled), EXIT_CANCELLED);

        let other: Result<(), std::io::Error> =
            Err(std::io::Error::other("stdout closed"));
        let other = other.context("writing report").unwrap_err();
        assert_eq!(exit_code_for(&other), EXIT_INTERNAL_ERROR);
    }
}

//! # checkline
//!
//! Runs a fixed set of independent check stages against a source tree,
//! concurrently, and reports every failing stage with its full output.
//!
//! Each stage is an external command with its own environment overrides
//! layered on a shared ambient environment. A stage may name a toolchain
//! whose environment is resolved before launch. Every stage runs to
//! completion; the run fails iff at least one stage fails.
//!
//! ## Quick Start
//!
//! ```no_run
//! use checkline::{Environment, Orchestrator, RunExecutor, Stage, configure, report};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let ambient: Environment = [("TERM_COLOR", "always")].into_iter().collect();
//! let run = configure(
//!     ambient,
//!     vec![
//!         Stage::new("formatting", ["cargo", "fmt", "--check"]),
//!         Stage::new("test", ["cargo", "test"]),
//!     ],
//! )?;
//!
//! let result = Orchestrator::default().execute(&run).await?;
//! print!("{}", report(&result));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod executor;
pub mod infrastructure;
pub mod pipeline;
pub mod report;

pub use executor::{
    LaunchConfig, Orchestrator, OrchestratorConfig, ResolveContext, RunExecutor, StageCommand,
    StagePlan, Toolchain, ToolchainRegistry, ToolchainResolver, expand_variables,
};
pub use infrastructure::{Config, DEFAULT_CHECK_FILE, init_logging};
pub use pipeline::{
    ConfigError, Environment, FailureCause, OrchestratorError, ProcessSpawnError, Run, RunResult,
    Stage, StageBuilder, StageOutcome, StageResult, ToolchainError, Validate, configure,
};
pub use report::{ReportFormat, render, report};

/// Version of the checkline crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

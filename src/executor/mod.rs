//! Run execution layer
//!
//! This module contains the orchestrator and the process plumbing it uses.

mod orchestrator;
mod shell;
mod toolchain;
mod traits;

pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use shell::{LaunchConfig, ProcessOutput, StageCommand, expand_variables};
pub use toolchain::{
    PROBE_SELECTOR_VAR, ResolveContext, Toolchain, ToolchainRegistry, ToolchainResolver,
};
pub use traits::{RunExecutor, StagePlan};

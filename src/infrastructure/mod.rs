//! Infrastructure layer
//!
//! Check file loading and logging setup.

mod config;
mod logging;

pub use config::{CommandSpec, Config, DEFAULT_CHECK_FILE, EnvValue, StageSpec, ToolchainSpec};
pub use logging::{LOG_ENV_VAR, init_logging};

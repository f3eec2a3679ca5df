//! Error types for the check domain

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating a stage set, before anything is spawned
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Two stages share a name
    #[error("Duplicate stage name: '{name}'")]
    DuplicateStage {
        /// The repeated name.
        name: String,
    },

    /// A stage has no program to run
    #[error("Stage '{stage}' has an empty command")]
    EmptyCommand {
        /// Name of the offending stage.
        stage: String,
    },

    /// Stage name cannot be empty
    #[error("Stage name cannot be empty")]
    EmptyName,

    /// The run would check nothing
    #[error("Run must have at least one stage")]
    NoStages,

    /// A stage was selected that the configuration does not define
    #[error("Unknown stage: '{name}'")]
    UnknownStage {
        /// The requested name.
        name: String,
    },

    /// A command line could not be split into arguments
    #[error("Stage '{stage}' has an unparsable command: {reason}")]
    InvalidCommand {
        /// Name of the offending stage.
        stage: String,
        /// Why splitting failed.
        reason: String,
    },

    /// The check file could not be read or parsed
    #[error("Invalid check file '{path}': {reason}")]
    InvalidFile {
        /// Path of the check file.
        path: String,
        /// Underlying read or parse error.
        reason: String,
    },
}

/// A stage's toolchain could not be resolved
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolchainError {
    /// Selector is not declared and no probe is configured
    #[error("Unknown toolchain '{selector}'")]
    Unknown {
        /// The requested selector.
        selector: String,
    },

    /// The probe ran and reported the toolchain missing
    #[error("Toolchain '{selector}' is unavailable: {reason}")]
    Unavailable {
        /// The requested selector.
        selector: String,
        /// Probe exit status or output.
        reason: String,
    },
}

/// The external command could not be launched at all
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Failed to spawn '{program}': {reason}")]
pub struct ProcessSpawnError {
    /// Program that was looked up.
    pub program: String,
    /// OS error text.
    pub reason: String,
}

/// Errors that abort a run as a whole
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// The stage set was rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The run was interrupted before every stage finished
    #[error("Run cancelled")]
    Cancelled,
}

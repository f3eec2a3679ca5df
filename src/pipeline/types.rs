//! Core types for stage outcomes
//!
//! A stage either passes or fails with a cause. Failures caused by the
//! command itself and failures that prevented it from running at all are
//! both ordinary outcomes recorded on the stage.

#![allow(clippy::must_use_candidate)]

use super::errors::{ProcessSpawnError, ToolchainError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a stage did not pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum FailureCause {
    /// The command exited with a non-zero code
    ExitCode {
        /// Exit code reported by the OS.
        code: i32,
    },

    /// The command was terminated by a signal
    Signal {
        /// Signal number.
        signal: i32,
    },

    /// The stage's toolchain could not be resolved
    Toolchain {
        /// Resolution error.
        error: ToolchainError,
    },

    /// The command could not be launched
    Spawn {
        /// Launch error.
        error: ProcessSpawnError,
    },
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitCode { code } => write!(f, "exit code {code}"),
            Self::Signal { signal } => write!(f, "terminated by signal {signal}"),
            Self::Toolchain { error } => write!(f, "toolchain error: {error}"),
            Self::Spawn { error } => write!(f, "spawn error: {error}"),
        }
    }
}

/// Outcome of a single stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StageOutcome {
    /// The command exited 0
    Success,
    /// Anything else
    Failure(FailureCause),
}

impl StageOutcome {
    /// Returns true if the stage passed
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the stage failed
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Returns the failure cause, if any
    #[must_use]
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            Self::Success => None,
            Self::Failure(cause) => Some(cause),
        }
    }

    /// Builds an outcome from a child's exit status
    pub fn from_exit_status(status: std::process::ExitStatus) -> Self {
        if status.success() {
            return Self::Success;
        }
        if let Some(code) = status.code() {
            return Self::Failure(FailureCause::ExitCode { code });
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Failure(FailureCause::Signal { signal });
            }
        }
        Self::Failure(FailureCause::ExitCode { code: -1 })
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "PASS"),
            Self::Failure(_) => write!(f, "FAIL"),
        }
    }
}

/// Trait for types that can be validated
#[allow(clippy::missing_errors_doc)]
pub trait Validate {
    /// Type of validation error
    type Error;

    /// Validates this type
    fn validate(&self) -> std::result::Result<(), Self::Error>;
}

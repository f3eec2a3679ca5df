//! Stage definition and builder
//!
//! A stage is one independent verification step: a command, its
//! environment overrides and an optional toolchain it needs.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::Environment;
use super::Validate;
use super::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named unit of verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Stage name, unique within a run
    pub name: String,

    /// Program followed by its arguments
    pub command: Vec<String>,

    /// Environment overrides for this stage only
    #[serde(default, skip_serializing_if = "Environment::is_empty")]
    pub env: Environment,

    /// Toolchain that must be resolved before the command runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<String>,
}

impl Validate for Stage {
    type Error = ConfigError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }

        match self.command.first() {
            Some(program) if !program.is_empty() => Ok(()),
            _ => Err(ConfigError::EmptyCommand {
                stage: self.name.clone(),
            }),
        }
    }
}

impl Stage {
    /// Creates a new stage
    pub fn new<I, S>(name: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            command: command.into_iter().map(Into::into).collect(),
            env: Environment::new(),
            toolchain: None,
        }
    }

    /// Creates a stage from a command line, split with shell quoting rules
    #[allow(clippy::missing_errors_doc)]
    pub fn from_command_line(name: impl Into<String>, line: &str) -> Result<Self, ConfigError> {
        let name = name.into();
        let command = shell_words::split(line).map_err(|e| ConfigError::InvalidCommand {
            stage: name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(name, command))
    }

    /// Adds an environment override
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env = self.env.set(key, value);
        self
    }

    /// Requires a toolchain for this stage
    pub fn with_toolchain(mut self, selector: impl Into<String>) -> Self {
        self.toolchain = Some(selector.into());
        self
    }

    /// Program to launch
    pub fn program(&self) -> &str {
        self.command.first().map_or("", String::as_str)
    }

    /// Arguments after the program
    pub fn args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stage({}): {}", self.name, shell_words::join(&self.command))?;
        if let Some(ref toolchain) = self.toolchain {
            write!(f, " [{toolchain}]")?;
        }
        Ok(())
    }
}

/// Builder for creating stages
pub struct StageBuilder {
    stage: Stage,
}

impl StageBuilder {
    /// Creates a new stage builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            stage: Stage::new(name, Vec::<String>::new()),
        }
    }

    /// Appends an argument; the first one is the program
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.stage.command.push(arg.into());
        self
    }

    /// Appends several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stage.command.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment override
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.stage.env = self.stage.env.set(key, value);
        self
    }

    /// Sets the toolchain selector
    pub fn toolchain(mut self, selector: impl Into<String>) -> Self {
        self.stage.toolchain = Some(selector.into());
        self
    }

    /// Builds the stage
    #[allow(clippy::missing_errors_doc)]
    pub fn build(self) -> Result<Stage, ConfigError> {
        self.stage.validate()?;
        Ok(self.stage)
    }

    /// Builds the stage without validation (for internal use)
    #[must_use]
    pub fn build_unchecked(self) -> Stage {
        self.stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_creation() {
        let stage = Stage::new("formatting", ["fmt", "--check"]);

        assert_eq!(stage.name, "formatting");
        assert_eq!(stage.program(), "fmt");
        assert_eq!(stage.args(), ["--check".to_string()]);
        assert!(stage.env.is_empty());
        assert!(stage.toolchain.is_none());
    }

    #[test]
    fn test_stage_validation_empty_name() {
        let stage = Stage::new("  ", ["test"]);
        assert_eq!(stage.validate(), Err(ConfigError::EmptyName));
    }

    #[test]
    fn test_stage_validation_empty_command() {
        let stage = Stage::new("test", Vec::<String>::new());
        assert!(matches!(
            stage.validate(),
            Err(ConfigError::EmptyCommand { stage }) if stage == "test"
        ));
    }

    #[test]
    fn test_stage_validation_blank_program() {
        let stage = Stage::new("test", [""]);
        assert!(matches!(stage.validate(), Err(ConfigError::EmptyCommand { .. })));
    }

    #[test]
    fn test_stage_args_without_arguments() {
        let stage = Stage::new("test", ["test"]);
        assert!(stage.args().is_empty());
    }

    #[test]
    fn test_stage_from_command_line() {
        let stage =
            Stage::from_command_line("linting", "lint --no-deps --message 'a b'").unwrap();
        assert_eq!(stage.command, ["lint", "--no-deps", "--message", "a b"]);
    }

    #[test]
    fn test_stage_from_command_line_unbalanced_quote() {
        let result = Stage::from_command_line("linting", "lint 'oops");
        assert!(matches!(result, Err(ConfigError::InvalidCommand { .. })));
    }

    #[test]
    fn test_stage_display() {
        let stage = Stage::new("udeps", ["udeps", "--workspace"]).with_toolchain("nightly");
        assert_eq!(stage.to_string(), "Stage(udeps): udeps --workspace [nightly]");
    }

    #[test]
    fn test_stage_builder() {
        let stage = StageBuilder::new("linting")
            .arg("lint")
            .args(["--no-deps", "--all-targets"])
            .env("WARNINGS_ARE_ERRORS", "1")
            .toolchain("stable")
            .build()
            .unwrap();

        assert_eq!(stage.command, ["lint", "--no-deps", "--all-targets"]);
        assert_eq!(stage.env.get("WARNINGS_ARE_ERRORS"), Some(&"1".to_string()));
        assert_eq!(stage.toolchain.as_deref(), Some("stable"));
    }

    #[test]
    fn test_stage_builder_rejects_empty_command() {
        let result = StageBuilder::new("test").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_stage_deserialize_defaults() {
        let stage: Stage =
            serde_json::from_str(r#"{"name":"test","command":["test"]}"#).unwrap();
        assert_eq!(stage, Stage::new("test", ["test"]));
    }
}

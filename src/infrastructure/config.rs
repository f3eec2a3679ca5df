//! Check file configuration
//!
//! A check file declares the ambient environment, the stages and the
//! toolchains they may request:
//!
//! ```yaml
//! env:
//!   TERM_COLOR: always
//! max_parallel: 4
//! toolchain_env: TOOLCHAIN
//! toolchains:
//!   nightly-2024-07-27:
//!     env: { RUSTUP_TOOLCHAIN: nightly-2024-07-27 }
//! stages:
//!   - name: formatting
//!     command: ["fmt", "--check"]
//!   - name: linting
//!     command: "lint --no-deps --all-targets"
//!     env: { WARNINGS_ARE_ERRORS: 1 }
//! ```

use crate::executor::{LaunchConfig, OrchestratorConfig, ToolchainRegistry};
use crate::pipeline::{ConfigError, Environment, Stage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Default check file name, looked up in the working directory
pub const DEFAULT_CHECK_FILE: &str = "checkline.yml";

/// Parsed check file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Ambient environment for every stage
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    /// Children start from the orchestrator's own environment
    #[serde(default = "default_true")]
    pub inherit_env: bool,

    /// Maximum stages in flight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,

    /// Variable exported with the selector to stages that use a toolchain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain_env: Option<String>,

    /// Command that checks an undeclared toolchain is installed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain_probe: Option<CommandSpec>,

    /// Statically declared toolchains
    #[serde(default)]
    pub toolchains: BTreeMap<String, ToolchainSpec>,

    /// Stages in configuration order
    #[serde(default)]
    pub stages: Vec<StageSpec>,
}

fn default_true() -> bool {
    true
}

/// One stage entry of a check file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    /// Stage name
    pub name: String,

    /// Program and arguments
    pub command: CommandSpec,

    /// Environment overrides
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    /// Toolchain selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<String>,
}

/// A declared toolchain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainSpec {
    /// Variables that activate the toolchain
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,
}

/// A command as an argument list or a single shell-quoted line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    /// `["lint", "--no-deps"]`
    Argv(Vec<String>),
    /// `"lint --no-deps"`
    Line(String),
}

impl CommandSpec {
    /// Splits the command into arguments
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCommand`] if a line has unbalanced quotes.
    pub fn to_argv(&self, owner: &str) -> Result<Vec<String>, ConfigError> {
        match self {
            Self::Argv(argv) => Ok(argv.clone()),
            Self::Line(line) => {
                shell_words::split(line).map_err(|e| ConfigError::InvalidCommand {
                    stage: owner.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Environment values may be written as YAML scalars of any kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    /// `"always"`
    String(String),
    /// `1`
    Integer(i64),
    /// `0.5`
    Float(f64),
    /// `true`
    Bool(bool),
}

impl std::fmt::Display for EnvValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

fn to_environment(vars: &BTreeMap<String, EnvValue>) -> Environment {
    vars.iter().map(|(k, v)| (k.clone(), v.to_string())).collect()
}

impl Config {
    /// Loads a check file from disk
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidFile`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidFile {
            path: path.display().to_string(),
            reason,
        };
        let content = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let config = Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::InvalidFile { reason, .. } => invalid(reason),
            other => other,
        })?;
        tracing::debug!(path = %path.display(), stages = config.stages.len(), "Loaded check file");
        Ok(config)
    }

    /// Parses a check file from YAML text
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidFile`] on malformed YAML or unknown keys.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::InvalidFile {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })
    }

    /// Ambient environment declared by the file
    #[must_use]
    pub fn ambient(&self) -> Environment {
        to_environment(&self.env)
    }

    /// Builds the stage list, keeping only `selected` when it is non-empty
    ///
    /// Stage validation itself is left to [`crate::configure`].
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnknownStage`] if a selected name is not declared
    /// - [`ConfigError::InvalidCommand`] if a command line cannot be split
    pub fn stages(&self, selected: &[String]) -> Result<Vec<Stage>, ConfigError> {
        if let Some(name) = selected
            .iter()
            .find(|name| !self.stages.iter().any(|s| &s.name == *name))
        {
            return Err(ConfigError::UnknownStage { name: name.clone() });
        }

        self.stages
            .iter()
            .filter(|spec| selected.is_empty() || selected.contains(&spec.name))
            .map(|spec| {
                Ok(Stage {
                    name: spec.name.clone(),
                    command: spec.command.to_argv(&spec.name)?,
                    env: to_environment(&spec.env),
                    toolchain: spec.toolchain.clone(),
                })
            })
            .collect()
    }

    /// Toolchain resolver for the declared toolchains and probe
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCommand`] if the probe line cannot be split.
    pub fn toolchains(&self) -> Result<ToolchainRegistry, ConfigError> {
        let mut registry = self
            .toolchains
            .iter()
            .fold(ToolchainRegistry::new(), |registry, (selector, spec)| {
                registry.declare(selector.clone(), to_environment(&spec.env))
            });

        if let Some(ref probe) = self.toolchain_probe {
            registry = registry.with_probe(probe.to_argv("toolchain_probe")?);
        }
        if let Some(ref var) = self.toolchain_env {
            registry = registry.with_selector_var(var.clone());
        }
        Ok(registry)
    }

    /// Orchestrator settings declared by the file
    #[must_use]
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_parallel: self.max_parallel,
            launch: LaunchConfig {
                inherit_env: self.inherit_env,
                streaming: false,
            },
        }
    }
}

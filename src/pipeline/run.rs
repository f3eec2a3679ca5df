//! Run definition and the `configure` entry point

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::Environment;
use super::errors::ConfigError;
use super::stage::Stage;
use super::types::Validate;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One execution of a validated stage set.
///
/// A `Run` can only be obtained through [`configure`], so every run that
/// reaches the executor has unique stage names and non-empty commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    id: Uuid,
    ambient: Environment,
    stages: Vec<Stage>,
    created_at: DateTime<Utc>,
    revision: Option<String>,
    workdir: Option<PathBuf>,
}

/// Validates a stage set against an ambient environment and builds a [`Run`].
///
/// No process is spawned. The first invalid stage, in configuration order,
/// determines the error.
///
/// # Errors
///
/// - [`ConfigError::NoStages`] if `stages` is empty
/// - [`ConfigError::EmptyName`] or [`ConfigError::EmptyCommand`] for a
///   malformed stage
/// - [`ConfigError::DuplicateStage`] if two stages share a name
pub fn configure(ambient: Environment, stages: Vec<Stage>) -> Result<Run, ConfigError> {
    check_stages(&stages)
        .inspect_err(|error| tracing::error!(%error, "Invalid run configuration"))?;

    let run = Run {
        id: Uuid::new_v4(),
        ambient,
        stages,
        created_at: Utc::now(),
        revision: None,
        workdir: None,
    };
    tracing::debug!(run_id = %run.id, stages = run.stages.len(), "Run configured");
    Ok(run)
}

fn check_stages(stages: &[Stage]) -> Result<(), ConfigError> {
    if stages.is_empty() {
        return Err(ConfigError::NoStages);
    }

    let mut seen = HashSet::with_capacity(stages.len());
    for stage in stages {
        stage.validate()?;
        if !seen.insert(stage.name.as_str()) {
            return Err(ConfigError::DuplicateStage {
                name: stage.name.clone(),
            });
        }
    }
    Ok(())
}

impl Run {
    /// Unique id of this run
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Environment shared by every stage
    pub fn ambient(&self) -> &Environment {
        &self.ambient
    }

    /// Stages in configuration order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Looks up a stage by name
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// When the run was configured
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Revision being checked, if the trigger supplied one
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Working directory for every stage; `None` inherits the caller's
    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    /// Tags the run with the revision being checked
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Runs every stage from `dir`
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }
}

impl fmt::Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Run({}): {} stages", self.id, self.stages.len())?;
        if let Some(ref revision) = self.revision {
            write!(f, " @ {revision}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stages() -> Vec<Stage> {
        vec![
            Stage::new("formatting", ["fmt", "--check"]),
            Stage::new("linting", ["lint", "--no-deps", "--all-targets"])
                .with_env("WARNINGS_ARE_ERRORS", "1"),
            Stage::new("udeps", ["udeps", "--workspace"]).with_toolchain("nightly-2024-07-27"),
            Stage::new("test", ["test"]),
        ]
    }

    #[test]
    fn test_configure_valid_run() {
        let ambient = Environment::new().set("TERM_COLOR", "always");
        let run = configure(ambient, stages()).unwrap();

        assert_eq!(run.stages().len(), 4);
        assert_eq!(run.ambient().get("TERM_COLOR"), Some(&"always".to_string()));
        assert!(run.stage("udeps").is_some());
        assert!(run.stage("deploy").is_none());
        assert!(run.revision().is_none());
    }

    #[test]
    fn test_configure_keeps_order() {
        let run = configure(Environment::new(), stages()).unwrap();
        let names: Vec<_> = run.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["formatting", "linting", "udeps", "test"]);
    }

    #[test]
    fn test_configure_duplicate_names() {
        let stages = vec![Stage::new("test", ["test"]), Stage::new("test", ["test", "--doc"])];
        let err = configure(Environment::new(), stages).unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateStage {
                name: "test".to_string()
            }
        );
    }

    #[test]
    fn test_configure_empty_command() {
        let mut stages = stages();
        stages.push(Stage::new("broken", Vec::<String>::new()));
        let err = configure(Environment::new(), stages).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyCommand { stage } if stage == "broken"));
    }

    #[test]
    fn test_configure_no_stages() {
        let err = configure(Environment::new(), vec![]).unwrap_err();
        assert_eq!(err, ConfigError::NoStages);
    }

    #[test]
    fn test_run_ids_are_unique() {
        let a = configure(Environment::new(), stages()).unwrap();
        let b = configure(Environment::new(), stages()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_run_with_revision_and_workdir() {
        let run = configure(Environment::new(), stages())
            .unwrap()
            .with_revision("3f2c1ab")
            .with_workdir("/tmp");
        assert_eq!(run.revision(), Some("3f2c1ab"));
        assert_eq!(run.workdir(), Some(Path::new("/tmp")));
        assert!(run.to_string().ends_with("4 stages @ 3f2c1ab"));
    }
}

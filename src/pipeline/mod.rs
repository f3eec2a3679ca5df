//! Check domain types and logic

pub mod errors;
pub mod result;
pub mod run;
pub mod stage;
pub mod types;


pub use errors::{ConfigError, OrchestratorError, ProcessSpawnError, ToolchainError};
pub use result::{RunResult, StageResult};
pub use run::{Run, configure};
pub use stage::{Stage, StageBuilder};
pub use types::{FailureCause, StageOutcome, Validate};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Environment variables applied to a stage's child process.
///
/// Used both for the ambient environment shared by every stage of a run
/// and for a single stage's overrides. Keys are kept sorted so plans and
/// reports render deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Environment {
    /// Environment variables as key-value pairs.
    #[serde(flatten)]
    pub vars: BTreeMap<String, String>,
}

impl Environment {
    /// Creates a new empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an environment variable.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Sets an environment variable in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Gets an environment variable by name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&String> {
        self.vars.get(key)
    }

    /// Returns true if no variable is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns a copy of `self` with every key of `overrides` replacing ours.
    #[must_use]
    pub fn overlay(&self, overrides: &Environment) -> Environment {
        let mut vars = self.vars.clone();
        vars.extend(
            overrides
                .vars
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Environment { vars }
    }

    /// Iterates over the variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

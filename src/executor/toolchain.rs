//! Toolchain resolution
//!
//! A stage may name a toolchain (`nightly-2024-07-27`, `stable`, ...) that
//! must be available before its command runs. Resolution turns the selector
//! into environment variables layered under the stage's own overrides.

use super::shell::{LaunchConfig, StageCommand};
use crate::pipeline::{Environment, StageOutcome, ToolchainError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Variable holding the selector while a probe runs
pub const PROBE_SELECTOR_VAR: &str = "TOOLCHAIN";

/// A resolved toolchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// The selector that was resolved
    pub selector: String,

    /// Variables that activate it for a stage
    pub env: Environment,
}

/// Where and how resolution commands run
///
/// Matches the run the stage belongs to, so a probe sees the same
/// environment and working directory as the stage it guards.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    /// Ambient environment of the run
    pub ambient: Environment,

    /// Launch settings of the run
    pub launch: LaunchConfig,

    /// Working directory of the run
    pub workdir: Option<PathBuf>,
}

/// Resolves toolchain selectors for stages
#[async_trait]
pub trait ToolchainResolver: Send + Sync {
    /// Resolves and activates `selector`
    ///
    /// # Errors
    ///
    /// Returns [`ToolchainError`] if the toolchain is unknown or unavailable.
    async fn resolve(
        &self,
        selector: &str,
        context: &ResolveContext,
    ) -> Result<Toolchain, ToolchainError>;

    /// The activation `resolve` would return, if known without running anything
    fn preview(&self, _selector: &str) -> Option<Toolchain> {
        None
    }
}

/// Resolver backed by declared toolchains and an optional probe command
///
/// Lookup order:
/// 1. a selector declared with [`declare`](Self::declare) resolves to its env
/// 2. otherwise the probe, if any, is run with `${TOOLCHAIN}` set to the
///    selector; exit 0 means available
/// 3. otherwise the selector is unknown
///
/// When a selector variable is configured, every resolved toolchain also
/// sets that variable to the selector.
#[derive(Debug, Clone, Default)]
pub struct ToolchainRegistry {
    declared: BTreeMap<String, Environment>,
    probe: Option<Vec<String>>,
    selector_var: Option<String>,
}

impl ToolchainRegistry {
    /// Creates a registry that knows no toolchains
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a toolchain and the variables that activate it
    #[must_use]
    pub fn declare(mut self, selector: impl Into<String>, env: Environment) -> Self {
        self.declared.insert(selector.into(), env);
        self
    }

    /// Sets the probe command used for undeclared selectors
    #[must_use]
    pub fn with_probe(mut self, probe: Vec<String>) -> Self {
        self.probe = (!probe.is_empty()).then_some(probe);
        self
    }

    /// Exports the selector to stages under `var`
    #[must_use]
    pub fn with_selector_var(mut self, var: impl Into<String>) -> Self {
        self.selector_var = Some(var.into());
        self
    }

    fn activation(&self, selector: &str, declared: Option<&Environment>) -> Toolchain {
        let mut env = declared.cloned().unwrap_or_default();
        if let Some(ref var) = self.selector_var {
            env.insert(var.clone(), selector);
        }
        Toolchain {
            selector: selector.to_string(),
            env,
        }
    }

    async fn run_probe(
        &self,
        probe: &[String],
        selector: &str,
        context: &ResolveContext,
    ) -> Result<(), ToolchainError> {
        let env = context.ambient.clone().set(PROBE_SELECTOR_VAR, selector);
        let label = format!("probe:{selector}");

        let output = StageCommand::new(&label, probe, &env, &context.launch)
            .current_dir(context.workdir.as_deref())
            .output()
            .await
            .map_err(|e| ToolchainError::Unavailable {
                selector: selector.to_string(),
                reason: e.to_string(),
            })?;

        match StageOutcome::from_exit_status(output.status) {
            StageOutcome::Success => Ok(()),
            StageOutcome::Failure(cause) => {
                let detail = output.stderr.trim();
                let reason = if detail.is_empty() {
                    format!("probe failed with {cause}")
                } else {
                    format!("probe failed with {cause}: {detail}")
                };
                Err(ToolchainError::Unavailable {
                    selector: selector.to_string(),
                    reason,
                })
            }
        }
    }
}

#[async_trait]
impl ToolchainResolver for ToolchainRegistry {
    async fn resolve(
        &self,
        selector: &str,
        context: &ResolveContext,
    ) -> Result<Toolchain, ToolchainError> {
        if let Some(env) = self.declared.get(selector) {
            tracing::debug!(toolchain = %selector, "Resolved declared toolchain");
            return Ok(self.activation(selector, Some(env)));
        }

        let Some(ref probe) = self.probe else {
            return Err(ToolchainError::Unknown {
                selector: selector.to_string(),
            });
        };

        self.run_probe(probe, selector, context).await?;
        tracing::debug!(toolchain = %selector, "Toolchain probe succeeded");
        Ok(self.activation(selector, None))
    }

    /// Declared toolchains preview in full. A probed selector previews as
    /// the selector variable alone, since the probe is not run.
    fn preview(&self, selector: &str) -> Option<Toolchain> {
        match self.declared.get(selector) {
            Some(env) => Some(self.activation(selector, Some(env))),
            None if self.probe.is_some() => Some(self.activation(selector, None)),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_declared_toolchain_resolves() {
        let registry = ToolchainRegistry::new().declare(
            "nightly-2024-07-27",
            Environment::new().set("RUSTUP_TOOLCHAIN", "nightly-2024-07-27"),
        );

        let toolchain = registry
            .resolve("nightly-2024-07-27", &ResolveContext::default())
            .await
            .unwrap();

        assert_eq!(toolchain.selector, "nightly-2024-07-27");
        assert_eq!(
            toolchain.env.get("RUSTUP_TOOLCHAIN"),
            Some(&"nightly-2024-07-27".to_string())
        );
    }

    #[tokio::test]
    async fn test_unknown_toolchain_without_probe() {
        let registry = ToolchainRegistry::new();
        let err = registry
            .resolve("stable", &ResolveContext::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ToolchainError::Unknown {
                selector: "stable".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_selector_var_is_exported() {
        let registry = ToolchainRegistry::new()
            .declare("stable", Environment::new())
            .with_selector_var("TOOLCHAIN_NAME");

        let toolchain = registry
            .resolve("stable", &ResolveContext::default())
            .await
            .unwrap();
        assert_eq!(toolchain.env.get("TOOLCHAIN_NAME"), Some(&"stable".to_string()));
    }

    #[tokio::test]
    async fn test_probe_success() {
        let registry = ToolchainRegistry::new()
            .with_probe(sh("test \"$TOOLCHAIN\" = beta"))
            .with_selector_var("TOOLCHAIN");

        let toolchain = registry
            .resolve("beta", &ResolveContext::default())
            .await
            .unwrap();
        assert_eq!(toolchain.env.get("TOOLCHAIN"), Some(&"beta".to_string()));
    }

    #[tokio::test]
    async fn test_probe_failure_is_unavailable() {
        let registry =
            ToolchainRegistry::new().with_probe(sh("echo \"no ${TOOLCHAIN}\" >&2; exit 1"));

        let err = registry
            .resolve("nightly", &ResolveContext::default())
            .await
            .unwrap_err();
        match err {
            ToolchainError::Unavailable { selector, reason } => {
                assert_eq!(selector, "nightly");
                assert!(reason.contains("exit code 1"));
                assert!(reason.contains("no nightly"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_probe_missing_program_is_unavailable() {
        let registry = ToolchainRegistry::new()
            .with_probe(vec!["checkline-missing-toolchain-manager".to_string()]);

        let err = registry
            .resolve("stable", &ResolveContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolchainError::Unavailable { .. }));
    }

    #[test]
    fn test_empty_probe_is_ignored() {
        let registry = ToolchainRegistry::new().with_probe(Vec::new());
        assert!(registry.probe.is_none());
    }

    #[tokio::test]
    async fn test_probe_runs_like_the_stage() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("rust-toolchain"), "beta\n").unwrap();
        let registry = ToolchainRegistry::new().with_probe(sh(
            "test \"$(cat rust-toolchain)\" = \"$TOOLCHAIN\" && test \"$CHANNEL\" = ci",
        ));

        let context = ResolveContext {
            ambient: Environment::new().set("CHANNEL", "ci").set("PATH", "/usr/bin:/bin"),
            launch: LaunchConfig {
                inherit_env: false,
                streaming: false,
            },
            workdir: Some(dir.path().to_path_buf()),
        };

        assert!(registry.resolve("beta", &context).await.is_ok());
        assert!(registry.resolve("stable", &context).await.is_err());
    }

    #[tokio::test]
    async fn test_probe_respects_cleared_environment() {
        let registry = ToolchainRegistry::new().with_probe(sh("test -z \"$HOME\""));
        let context = ResolveContext {
            ambient: Environment::new().set("PATH", "/usr/bin:/bin"),
            launch: LaunchConfig {
                inherit_env: false,
                streaming: false,
            },
            workdir: None,
        };

        assert!(registry.resolve("stable", &context).await.is_ok());
    }

    #[test]
    fn test_preview_without_probing() {
        let registry = ToolchainRegistry::new()
            .declare("nightly", Environment::new().set("RUSTUP_TOOLCHAIN", "nightly"))
            .with_selector_var("TOOLCHAIN");

        let declared = registry.preview("nightly").unwrap();
        assert_eq!(declared.env.get("RUSTUP_TOOLCHAIN"), Some(&"nightly".to_string()));
        assert_eq!(declared.env.get("TOOLCHAIN"), Some(&"nightly".to_string()));
        assert!(registry.preview("beta").is_none());

        let probed = registry.with_probe(sh("exit 1")).preview("beta").unwrap();
        assert_eq!(probed.env.get("TOOLCHAIN"), Some(&"beta".to_string()));
        assert_eq!(probed.env.len(), 1);
    }
}

//! `checkline validate` and `checkline plan`
//!
//! Both load the check file and build the run exactly as `checkline run`
//! would, without launching anything.
//!
//! ## Example
//!
//! ```bash
//! checkline validate -c checks.yml
//! # Exit code 0: configuration is valid
//! # Exit code 2: duplicate stage name, empty command, unknown key, ...
//! ```

use super::SourceArgs;
use anyhow::{Context, Result};
use checkline::{
    Config, Orchestrator, ReportFormat, Run, RunExecutor, StagePlan, configure,
};
use std::fmt::Write as _;

/// Loads the check file and builds the run it describes
///
/// `--env` values are layered over the file's ambient environment.
pub fn load_run(source: &SourceArgs) -> Result<(Config, Run)> {
    let path = &source.config;
    let config = Config::load(path)
        .with_context(|| format!("Failed to load check file: {}", path.display()))?;

    let mut ambient = config.ambient();
    for (key, value) in &source.env {
        ambient.insert(key.clone(), value.clone());
    }

    let stages = config.stages(&source.stages)?;
    let run = configure(ambient, stages)
        .with_context(|| format!("Invalid stages in {}", path.display()))?;

    tracing::debug!(run = %run, "Run configured");
    Ok((config, run))
}

/// Validates the check file
pub fn validate(source: &SourceArgs) -> Result<()> {
    let (config, run) = load_run(source)?;
    // Probe commands are split here so a bad probe fails validation too.
    config.toolchains()?;

    println!(
        "{}: {} stage(s) OK",
        source.config.display(),
        run.stages().len()
    );
    Ok(())
}

/// Describes what `checkline run` would launch
pub fn plan(source: &SourceArgs, format: ReportFormat) -> Result<String> {
    let (config, run) = load_run(source)?;
    let orchestrator = Orchestrator::new(config.orchestrator()).with_toolchains(config.toolchains()?);
    let plans = orchestrator.dry_run(&run);

    match format {
        ReportFormat::Text => Ok(render_plan(&plans)),
        ReportFormat::Json => {
            serde_json::to_string_pretty(&plans).context("Failed to serialize plan")
        }
    }
}

fn render_plan(plans: &[StagePlan]) -> String {
    let mut out = String::new();
    for plan in plans {
        let _ = write!(out, "{}: {}", plan.stage, shell_words::join(&plan.argv));
        if let Some(ref toolchain) = plan.toolchain {
            let _ = write!(out, " [toolchain {toolchain}]");
        }
        out.push('\n');
        for (key, value) in plan.env.iter() {
            let _ = writeln!(out, "    {key}={value}");
        }
    }
    out
}

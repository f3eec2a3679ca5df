//! Run reports
//!
//! The text report lists every stage, then repeats every failing stage with
//! its full captured output. Passing stages stay on their summary line.

use crate::pipeline::{RunResult, StageResult};
use std::fmt::Write as _;
use std::time::Duration;

/// Output format of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// Human-readable text
    #[default]
    Text,
    /// Pretty-printed JSON of the whole [`RunResult`]
    Json,
}

/// Renders `result` in the requested format
///
/// # Errors
///
/// Returns `serde_json::Error` if JSON serialization fails.
pub fn render(result: &RunResult, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(report(result)),
        ReportFormat::Json => serde_json::to_string_pretty(result),
    }
}

/// Human-readable summary of a run
#[must_use]
pub fn report(result: &RunResult) -> String {
    let mut out = String::new();
    let width = result
        .stages
        .iter()
        .map(|s| s.stage.chars().count())
        .max()
        .unwrap_or(0);

    let _ = write!(out, "Run {}", result.run_id);
    if let Some(ref revision) = result.revision {
        let _ = write!(out, " @ {revision}");
    }
    out.push('\n');

    for stage in &result.stages {
        let _ = write!(
            out,
            "  {}  {:<width$}  {:>8}",
            stage.outcome,
            stage.stage,
            format_duration(stage.duration()),
        );
        if let Some(cause) = stage.outcome.cause() {
            let _ = write!(out, "  {cause}");
        }
        out.push('\n');
    }

    for stage in result.failures() {
        out.push('\n');
        write_failure(&mut out, stage);
    }

    out.push('\n');
    let failing = result.failing_stages();
    let _ = write!(
        out,
        "{} passed, {} failed in {}: ",
        result.passed_count(),
        failing.len(),
        format_duration(result.duration()),
    );
    if result.is_success() {
        out.push_str("SUCCESS\n");
    } else {
        let _ = writeln!(out, "FAILURE ({})", failing.join(", "));
    }

    out
}

fn write_failure(out: &mut String, stage: &StageResult) {
    let cause = stage
        .outcome
        .cause()
        .map(ToString::to_string)
        .unwrap_or_default();
    let _ = writeln!(out, "--- {}: FAIL ({cause}) ---", stage.stage);

    if stage.is_silent() {
        out.push_str("(no output)\n");
        return;
    }

    for (label, text) in [("stdout", &stage.stdout), ("stderr", &stage.stderr)] {
        if text.is_empty() {
            continue;
        }
        let _ = writeln!(out, "[{label}]");
        out.push_str(text);
        if !text.ends_with('\n') {
            out.push('\n');
        }
    }
}

fn format_duration(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f64())
}

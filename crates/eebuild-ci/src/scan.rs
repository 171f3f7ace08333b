//! Vulnerability scan of a built image.
//!
//! Never fatal: every failure ends up as [`ScanOutcome::Skipped`] or a
//! summary without counts, logged and otherwise ignored.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use eebuild_core::{emit_scan_degraded, ScanError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::builder::BuildArtifact;
use crate::context::RunContext;
use crate::runner::{CommandRunner, CommandSpec};

/// Severities requested from the scanner.
pub const SCAN_SEVERITIES: &str = "CRITICAL,HIGH,MEDIUM";

/// Report directory mount point inside the fallback scanner container.
const FALLBACK_OUTPUT_DIR: &str = "/out";

/// Which invocation produced the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerPath {
    /// The scanner binary on the host.
    Native,
    /// The scanner image run through the container engine.
    Container,
}

/// What a finished scan left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub report_path: PathBuf,
    pub scanner: ScannerPath,

    /// Scanner exit code. Recorded, never acted on.
    pub exit_code: i32,

    /// SARIF result counts keyed by level (`error`, `warning`, `note`, ...).
    pub findings: BTreeMap<String, usize>,

    /// Set when the report could not be parsed.
    pub parse_error: Option<String>,
}

impl ScanSummary {
    pub fn total_findings(&self) -> usize {
        self.findings.values().sum()
    }
}

/// Result of the scan stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed(ScanSummary),
    /// No report was produced by either invocation.
    Skipped(ScanError),
}

impl ScanOutcome {
    pub fn summary(&self) -> Option<&ScanSummary> {
        match self {
            ScanOutcome::Completed(summary) => Some(summary),
            ScanOutcome::Skipped(_) => None,
        }
    }

    /// Short status for stage records.
    pub fn status(&self) -> &'static str {
        match self {
            ScanOutcome::Completed(_) => "completed",
            ScanOutcome::Skipped(_) => "skipped",
        }
    }
}

/// Scan `artifact`, writing SARIF to `ctx.report_path`.
pub async fn scan_image(
    runner: &dyn CommandRunner,
    ctx: &RunContext,
    artifact: &BuildArtifact,
) -> ScanOutcome {
    let report = ctx.report_path.as_path();
    if let Err(e) = std::fs::remove_file(report) {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %report.display(), error = %e, "Could not remove stale report");
        }
    }

    let primary = CommandSpec::new(&ctx.scanner_program)
        .args(["image", "--format", "sarif", "--output"])
        .arg(report.to_string_lossy())
        .args(["--severity", SCAN_SEVERITIES])
        .arg(&artifact.image);

    let first_error = match run_scanner(runner, &primary, report).await {
        Ok(exit_code) => return completed(report, ScannerPath::Native, exit_code),
        Err(e) => e,
    };
    info!(
        error = %first_error,
        image = %ctx.scanner_image,
        "Scanner unavailable, retrying through container engine"
    );

    match fallback_spec(ctx, artifact) {
        Ok(spec) => match run_scanner(runner, &spec, report).await {
            Ok(exit_code) => completed(report, ScannerPath::Container, exit_code),
            Err(e) => skipped(e),
        },
        Err(e) => skipped(e),
    }
}

fn fallback_spec(
    ctx: &RunContext,
    artifact: &BuildArtifact,
) -> std::result::Result<CommandSpec, ScanError> {
    let report = ctx.report_path.as_path();
    let unavailable = |reason: String| ScanError::Unavailable {
        program: ctx.scanner_image.clone(),
        reason,
    };

    let dir = match report.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dir = std::fs::canonicalize(dir)
        .map_err(|e| unavailable(format!("report directory {}: {e}", dir.display())))?;
    let file = report
        .file_name()
        .ok_or_else(|| unavailable(format!("report path {} has no file name", report.display())))?;

    let socket = artifact.runtime.socket_path();
    Ok(CommandSpec::new(artifact.runtime.program())
        .args(["run", "--rm", "-v"])
        .arg(format!("{}:{}", dir.display(), FALLBACK_OUTPUT_DIR))
        .arg("-v")
        .arg(format!("{socket}:{socket}"))
        .arg(&ctx.scanner_image)
        .args(["image", "--format", "sarif", "--output"])
        .arg(format!("{}/{}", FALLBACK_OUTPUT_DIR, file.to_string_lossy()))
        .args(["--severity", SCAN_SEVERITIES])
        .arg(&artifact.image))
}

/// Run one scanner invocation; `Ok(exit_code)` when it left a report.
async fn run_scanner(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
    report: &Path,
) -> std::result::Result<i32, ScanError> {
    let output = runner.run(spec).await.map_err(|e| ScanError::Unavailable {
        program: spec.program.clone(),
        reason: e.to_string(),
    })?;

    if report.is_file() {
        Ok(output.exit_code)
    } else {
        Err(ScanError::NoReport {
            program: spec.program.clone(),
            exit_code: output.exit_code,
        })
    }
}

fn completed(report: &Path, scanner: ScannerPath, exit_code: i32) -> ScanOutcome {
    let (findings, parse_error) = match summarize_sarif(report) {
        Ok(findings) => (findings, None),
        Err(e) => {
            emit_scan_degraded(&e);
            let reason = match &e {
                ScanError::InvalidReport { reason, .. } => reason.clone(),
                other => other.to_string(),
            };
            (BTreeMap::new(), Some(reason))
        }
    };

    let summary = ScanSummary {
        report_path: report.to_path_buf(),
        scanner,
        exit_code,
        findings,
        parse_error,
    };
    info!(
        report = %summary.report_path.display(),
        findings = summary.total_findings(),
        exit_code = exit_code,
        "Scan report written"
    );
    ScanOutcome::Completed(summary)
}

fn skipped(error: ScanError) -> ScanOutcome {
    emit_scan_degraded(&error);
    ScanOutcome::Skipped(error)
}

/// Count SARIF results by level. Results without a level count as `warning`.
pub fn summarize_sarif(path: &Path) -> std::result::Result<BTreeMap<String, usize>, ScanError> {
    let invalid = |reason: String| ScanError::InvalidReport {
        path: path.to_path_buf(),
        reason,
    };

    let raw = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let doc: serde_json::Value = serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))?;
    let runs = doc
        .get("runs")
        .and_then(|r| r.as_array())
        .ok_or_else(|| invalid("missing 'runs' array".to_string()))?;

    let mut counts = BTreeMap::new();
    for result in runs
        .iter()
        .filter_map(|run| run.get("results").and_then(|r| r.as_array()))
        .flatten()
    {
        let level = result
            .get("level")
            .and_then(|l| l.as_str())
            .unwrap_or("warning");
        *counts.entry(level.to_string()).or_insert(0) += 1;
    }
    Ok(counts)
}

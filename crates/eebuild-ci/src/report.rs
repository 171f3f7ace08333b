//! JSON run report written at the end of a run.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::functional::CheckResult;
use crate::pipeline::{PipelineResult, StageRecord};
use crate::scan::{ScanOutcome, ScanSummary};

/// Current run report schema version.
pub const RUN_REPORT_SCHEMA: &str = "1.0";

/// Scan section of the run report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanArtifact {
    Completed(ScanSummary),
    Skipped { reason: String },
}

/// Failure section of the run report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureArtifact {
    pub kind: String,
    pub message: String,
}

/// Persisted summary of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReportArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub tool_version: String,
    pub run_id: String,
    pub event: String,
    pub manifest_digest: Option<String>,
    pub image: Option<String>,
    pub image_id: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
    pub stages: Vec<StageRecord>,
    pub checks: Vec<CheckResult>,
    pub scan: Option<ScanArtifact>,
    pub tags: Vec<String>,
    pub publish: bool,
    pub pushed: Vec<String>,
    pub failure: Option<FailureArtifact>,
}

impl RunReportArtifact {
    pub fn from_result(result: &PipelineResult, event: &str) -> Self {
        let scan = result.scan.as_ref().map(|outcome| match outcome {
            ScanOutcome::Completed(summary) => ScanArtifact::Completed(summary.clone()),
            ScanOutcome::Skipped(e) => ScanArtifact::Skipped {
                reason: e.to_string(),
            },
        });

        Self {
            schema_version: RUN_REPORT_SCHEMA.to_string(),
            generated_at: Utc::now(),
            tool_version: eebuild_core::VERSION.to_string(),
            run_id: result.run_id.clone(),
            event: event.to_string(),
            manifest_digest: result.manifest_digest.clone(),
            image: result.artifact.as_ref().map(|a| a.image.clone()),
            image_id: result.artifact.as_ref().map(|a| a.image_id.clone()),
            success: result.success(),
            duration_ms: result.duration_ms,
            stages: result.stages.clone(),
            checks: result
                .tests
                .as_ref()
                .map(|t| t.results.clone())
                .unwrap_or_default(),
            scan,
            tags: result
                .tag_policy
                .as_ref()
                .map(|p| p.tags.as_slice().to_vec())
                .unwrap_or_default(),
            publish: result.tag_policy.as_ref().is_some_and(|p| p.publish),
            pushed: result.pushed.clone(),
            failure: result.error.as_ref().map(|e| FailureArtifact {
                kind: e.kind().to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// Write the run report as pretty JSON.
pub fn write_run_report(path: &Path, artifact: &RunReportArtifact) -> Result<()> {
    let content = serde_json::to_string_pretty(artifact).context("serialize run report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

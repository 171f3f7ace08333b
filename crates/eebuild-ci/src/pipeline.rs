//! Pipeline orchestration.
//!
//! Stages run strictly in order, one external command at a time. The first
//! fatal error halts the run and becomes its final status; a scan problem is
//! recorded as degraded and the run carries on.

use std::time::Instant;

use eebuild_core::{
    compute_tag_policy, emit_pipeline_finished, emit_pipeline_started, emit_stage_finished,
    emit_stage_started, run_span, LoadedManifest, PipelineError, Result, TagPolicy,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};

use crate::builder::{build_image, resolve_existing_image, BuildArtifact};
use crate::context::RunContext;
use crate::functional::{run_functional_suite, TestReport};
use crate::gate::{FunctionalGate, GateVerdict};
use crate::publish::publish;
use crate::runner::CommandRunner;
use crate::scan::{scan_image, ScanOutcome};
use crate::stage::{Stage, StagePlan};
use crate::validate::validate_manifest;

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Passed,
    Failed,
    /// Finished without doing its work (no report, nothing to publish).
    Skipped,
    /// Non-fatal problem; the run continued.
    Degraded,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Passed => "passed",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
            StageStatus::Degraded => "degraded",
        }
    }
}

/// One executed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub duration_ms: u64,
    pub detail: String,
}

/// Result of a complete pipeline execution.
#[derive(Debug)]
pub struct PipelineResult {
    pub run_id: String,

    /// Digest of the manifest, when one was loaded.
    pub manifest_digest: Option<String>,

    /// Executed stages, in order. Stages after a fatal failure are absent.
    pub stages: Vec<StageRecord>,

    pub artifact: Option<BuildArtifact>,
    pub tests: Option<TestReport>,
    pub gate: Option<GateVerdict>,
    pub scan: Option<ScanOutcome>,
    pub tag_policy: Option<TagPolicy>,

    /// References pushed, in push order.
    pub pushed: Vec<String>,

    /// The fatal error that halted the run.
    pub error: Option<PipelineError>,

    pub duration_ms: u64,
}

impl PipelineResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    /// The stage that halted the run.
    pub fn failed_stage(&self) -> Option<Stage> {
        self.stages
            .iter()
            .find(|r| r.status == StageStatus::Failed)
            .map(|r| r.stage)
    }

    /// `Err` with the fatal error, `Ok` with the result otherwise.
    pub fn into_result(mut self) -> Result<Self> {
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Pipeline orchestrator.
pub struct Pipeline;

impl Pipeline {
    /// Execute the enabled stages of `plan` for `ctx`.
    ///
    /// The manifest is required when validate or build run; otherwise it is
    /// only read for the expected collection list, and an unreadable manifest
    /// is a warning. Stages that need an image and run without a build
    /// resolve `ctx.image_tag` from the engine.
    pub async fn run(
        runner: &dyn CommandRunner,
        ctx: &RunContext,
        plan: &StagePlan,
    ) -> PipelineResult {
        let mut state = RunState {
            runner,
            ctx,
            loaded: None,
            load_error: None,
            artifact: None,
            tests: None,
            gate: None,
            scan: None,
            tag_policy: None,
            pushed: Vec::new(),
        };

        let needs_manifest = plan.is_enabled(Stage::Validate) || plan.is_enabled(Stage::Build);
        match LoadedManifest::load(&ctx.manifest_path) {
            Ok(loaded) => state.loaded = Some(loaded),
            Err(e) if needs_manifest => state.load_error = Some(e.into()),
            Err(e) => warn!(
                manifest = %ctx.manifest_path.display(),
                error = %e,
                "Manifest unavailable, expected collections come from flags only"
            ),
        }

        let run_id = ctx.run_id.to_string();
        let manifest_digest = state.loaded.as_ref().map(|l| l.digest.to_string());
        let span = run_span(
            &run_id,
            state
                .loaded
                .as_ref()
                .map(|l| l.digest.short())
                .unwrap_or("none"),
        );

        Self::run_stages(state, plan, run_id, manifest_digest)
            .instrument(span)
            .await
    }

    async fn run_stages(
        mut state: RunState<'_>,
        plan: &StagePlan,
        run_id: String,
        manifest_digest: Option<String>,
    ) -> PipelineResult {
        let start = Instant::now();
        let stage_names: Vec<&str> = plan.enabled().map(|s| s.name()).collect();
        emit_pipeline_started(&run_id, &state.ctx.event.label(), &stage_names);

        let mut records = Vec::new();
        let mut error = None;

        for stage in plan.enabled() {
            emit_stage_started(stage.name());
            let stage_start = Instant::now();

            let outcome = state.execute(stage).await;
            let duration_ms = stage_start.elapsed().as_millis() as u64;

            let (status, detail) = match outcome {
                Ok(done) => done,
                Err(e) => {
                    let detail = e.to_string();
                    error = Some(e);
                    (StageStatus::Failed, detail)
                }
            };
            emit_stage_finished(stage.name(), duration_ms, status.as_str());
            records.push(StageRecord {
                stage,
                status,
                duration_ms,
                detail,
            });

            if error.is_some() {
                info!(stage = %stage, "Halting run after fatal stage failure");
                break;
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        emit_pipeline_finished(&run_id, duration_ms, error.is_none());

        PipelineResult {
            run_id,
            manifest_digest,
            stages: records,
            artifact: state.artifact,
            tests: state.tests,
            gate: state.gate,
            scan: state.scan,
            tag_policy: state.tag_policy,
            pushed: state.pushed,
            error,
            duration_ms,
        }
    }
}

struct RunState<'a> {
    runner: &'a dyn CommandRunner,
    ctx: &'a RunContext,
    loaded: Option<LoadedManifest>,
    load_error: Option<PipelineError>,
    artifact: Option<BuildArtifact>,
    tests: Option<TestReport>,
    gate: Option<GateVerdict>,
    scan: Option<ScanOutcome>,
    tag_policy: Option<TagPolicy>,
    pushed: Vec<String>,
}

impl RunState<'_> {
    async fn execute(&mut self, stage: Stage) -> Result<(StageStatus, String)> {
        let (runner, ctx) = (self.runner, self.ctx);
        match stage {
            Stage::Validate => {
                let loaded = self.manifest()?;
                validate_manifest(runner, ctx, loaded).await?;
                Ok((StageStatus::Passed, format!("manifest {}", loaded.digest.short())))
            }
            Stage::Build => {
                let loaded = self.manifest()?;
                let artifact = build_image(runner, ctx, loaded).await?;
                let detail = format!("{} ({})", artifact.image, artifact.image_id);
                self.artifact = Some(artifact);
                Ok((StageStatus::Passed, detail))
            }
            Stage::Test => {
                let artifact = self.image().await?;
                let suite = ctx.suite.clone().expect_collections(
                    self.loaded
                        .as_ref()
                        .map(|l| l.manifest.collection_names())
                        .unwrap_or_default(),
                );
                let report = run_functional_suite(runner, &artifact, &suite).await;
                let verdict = FunctionalGate::evaluate(&report);
                let detail = verdict.message.clone();
                self.tests = Some(report);
                self.gate = Some(verdict.clone());
                verdict.into_result()?;
                Ok((StageStatus::Passed, detail))
            }
            Stage::Scan => {
                let artifact = self.image().await?;
                let outcome = scan_image(runner, ctx, &artifact).await;
                let result = match &outcome {
                    ScanOutcome::Completed(summary) => (
                        StageStatus::Passed,
                        format!(
                            "{} finding(s) in {}",
                            summary.total_findings(),
                            summary.report_path.display()
                        ),
                    ),
                    ScanOutcome::Skipped(e) => (StageStatus::Degraded, e.to_string()),
                };
                self.scan = Some(outcome);
                Ok(result)
            }
            Stage::Tag => {
                let policy = self.policy().clone();
                Ok((
                    StageStatus::Passed,
                    format!(
                        "{} (publish: {})",
                        policy.tags.as_slice().join(", "),
                        policy.publish
                    ),
                ))
            }
            Stage::Publish => {
                let policy = self.policy().clone();
                if !policy.publish {
                    return Ok((
                        StageStatus::Skipped,
                        format!("{} does not publish", ctx.event.label()),
                    ));
                }
                let artifact = self.image().await?;
                let report = publish(
                    runner,
                    &artifact,
                    &policy.tags,
                    &ctx.registry,
                    ctx.credential.as_ref(),
                )
                .await?;
                let detail = format!("pushed {}", report.pushed.join(", "));
                self.pushed = report.pushed;
                Ok((StageStatus::Passed, detail))
            }
        }
    }

    fn manifest(&mut self) -> Result<&LoadedManifest> {
        if let Some(err) = self.load_error.take() {
            return Err(err);
        }
        self.loaded.as_ref().ok_or_else(|| {
            PipelineError::Config(format!(
                "manifest {} is not loaded",
                self.ctx.manifest_path.display()
            ))
        })
    }

    /// The built image, or the existing image at `ctx.image_tag`.
    async fn image(&mut self) -> Result<BuildArtifact> {
        if let Some(artifact) = &self.artifact {
            return Ok(artifact.clone());
        }
        let artifact = resolve_existing_image(self.runner, self.ctx).await?;
        info!(image = %artifact.image, image_id = %artifact.image_id, "Using existing image");
        self.artifact = Some(artifact.clone());
        Ok(artifact)
    }

    /// Computed at most once per run.
    fn policy(&mut self) -> &TagPolicy {
        let ctx = self.ctx;
        self.tag_policy
            .get_or_insert_with(|| compute_tag_policy(&ctx.event, &ctx.registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{ScriptedResponse, ScriptedRunner};
    use eebuild_core::RegistryTarget;

    #[test]
    fn test_stage_status_labels() {
        assert_eq!(StageStatus::Degraded.as_str(), "degraded");
        assert_eq!(StageStatus::Skipped.as_str(), "skipped");
    }

    #[tokio::test]
    async fn test_missing_manifest_fails_validate_before_any_command() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(RegistryTarget::new("ghcr.io", "acme/ee"))
            .with_manifest(dir.path().join("missing.yml"));
        let runner = ScriptedRunner::new();

        let result = Pipeline::run(&runner, &ctx, &StagePlan::local()).await;
        assert!(!result.success());
        assert_eq!(result.failed_stage(), Some(Stage::Validate));
        assert_eq!(result.stages.len(), 1);
        assert!(runner.calls().is_empty());
        assert_eq!(result.into_result().unwrap_err().kind(), "config");
    }

    #[tokio::test]
    async fn test_scan_only_run_uses_existing_image_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(RegistryTarget::new("ghcr.io", "acme/ee"))
            .with_manifest(dir.path().join("missing.yml"))
            .with_report_path(dir.path().join("trivy-results.sarif"));
        let runner = ScriptedRunner::new()
            .on(&["image", "inspect"], ScriptedResponse::ok("sha256:42"))
            .on(&["trivy"], ScriptedResponse::not_found())
            .on(&["run"], ScriptedResponse::exit(125, "no engine"));

        let result = Pipeline::run(&runner, &ctx, &StagePlan::only(&[Stage::Scan])).await;
        assert!(result.success());
        assert_eq!(result.stages[0].status, StageStatus::Degraded);
        assert_eq!(result.artifact.unwrap().image_id, "sha256:42");
    }

    #[tokio::test]
    async fn test_tag_policy_computed_once_and_publish_skipped_for_manual() {
        let ctx = RunContext::new(RegistryTarget::new("ghcr.io", "acme/ee"));
        let runner = ScriptedRunner::new();

        let plan = StagePlan::only(&[Stage::Tag, Stage::Publish]);
        let result = Pipeline::run(&runner, &ctx, &plan).await;
        assert!(result.success());
        assert_eq!(result.stages[1].status, StageStatus::Skipped);
        assert!(result.pushed.is_empty());
        assert!(runner.calls().is_empty());
        assert!(!result.tag_policy.unwrap().publish);
    }
}

//! Structured log events for the pipeline lifecycle.
//!
//! - Run-scoped tracing span via `run_span`
//! - One emission function per lifecycle event: run start/finish, stage
//!   start/finish, functional check outcome, degraded scan
//!
//! Events are emitted at `info!` (soft failures at `warn!`); filter with
//! `RUST_LOG`, switch to JSON with `--json`.

use tracing::{error, info, warn};

/// Run-scoped span. Attach it to the run future with
/// [`tracing::Instrument::instrument`] so every log line of the run carries
/// `run_id` and `manifest`.
pub fn run_span(run_id: &str, manifest_digest: &str) -> tracing::Span {
    tracing::info_span!("eebuild.run", run_id = %run_id, manifest = %manifest_digest)
}

pub fn emit_pipeline_started(run_id: &str, event: &str, stages: &[&str]) {
    info!(
        event = "pipeline.started",
        run_id = %run_id,
        trigger = %event,
        stages = %stages.join(","),
    );
}

pub fn emit_pipeline_finished(run_id: &str, duration_ms: u64, success: bool) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        success = success,
    );
}

pub fn emit_stage_started(stage: &str) {
    info!(event = "stage.started", stage = %stage);
}

pub fn emit_stage_finished(stage: &str, duration_ms: u64, status: &str) {
    info!(
        event = "stage.finished",
        stage = %stage,
        duration_ms = duration_ms,
        status = %status,
    );
}

/// A functional check finished. Failed hard checks are logged as errors,
/// failed soft checks as warnings.
pub fn emit_check_finished(check: &str, hard: bool, passed: bool, detail: &str) {
    if passed {
        info!(event = "check.finished", check = %check, hard = hard, passed = true);
    } else if hard {
        error!(
            event = "check.failed",
            check = %check,
            hard = true,
            passed = false,
            detail = %detail,
        );
    } else {
        warn!(event = "check.warning", check = %check, detail = %detail);
    }
}

/// The scan step did not produce a usable report; the run continues.
pub fn emit_scan_degraded(error: &dyn std::fmt::Display) {
    warn!(event = "scan.degraded", error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let span = run_span("test-run-id", "abc123");
        let _entered = span.enter();
        emit_stage_started("validate");
    }
}

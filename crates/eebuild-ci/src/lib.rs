//! eebuild CI stages
//!
//! Validate, build, smoke-test, scan and publish an execution environment
//! image. Every external tool is reached through [`CommandRunner`], and every
//! stage receives the same immutable [`RunContext`].

pub mod builder;
pub mod context;
pub mod fakes;
pub mod functional;
pub mod gate;
pub mod pipeline;
pub mod publish;
pub mod report;
pub mod runner;
pub mod scan;
pub mod stage;
pub mod validate;

pub use builder::{build_image, resolve_existing_image, BuildArtifact};
pub use context::{FunctionalSuite, RunContext};
pub use functional::{run_functional_suite, CheckResult, FunctionalCheck, TestReport};
pub use gate::{FunctionalGate, GateVerdict};
pub use pipeline::{Pipeline, PipelineResult, StageRecord, StageStatus};
pub use publish::{publish, PublishReport};
pub use report::{write_run_report, RunReportArtifact};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use scan::{scan_image, ScanOutcome, ScanSummary};
pub use stage::{Stage, StageConfig, StagePlan};
pub use validate::validate_manifest;

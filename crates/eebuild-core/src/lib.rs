//! eebuild Core Library
//!
//! Shared building blocks for the execution-environment pipeline:
//! - the declarative build manifest and its embedded sub-documents
//! - the trigger event model and the tag/publish policy derived from it
//! - registry settings and redacted credentials
//! - the pipeline error taxonomy
//! - tracing setup and lifecycle log events

pub mod digest;
pub mod error;
pub mod event;
pub mod manifest;
pub mod obs;
pub mod policy;
pub mod registry;
pub mod runtime;
pub mod telemetry;

pub use digest::ManifestDigest;
pub use error::{ManifestError, PipelineError, Result, ScanError};
pub use event::EventContext;
pub use manifest::{
    BaseImage, BuildFile, BuildOptions, BuildSteps, CollectionRequirement, ContainerInit,
    Dependencies, Exclusions, GalaxyRequirements, Images, LoadedManifest, Manifest, PipPackage,
    PythonInterpreter, PythonRequirements, RoleRequirement, SystemPackage, SystemRequirements,
};
pub use obs::{
    emit_check_finished, emit_pipeline_finished, emit_pipeline_started, emit_scan_degraded,
    emit_stage_finished, emit_stage_started, run_span,
};
pub use policy::{compute_tag_policy, TagPolicy, TagSet};
pub use registry::{RegistryCredential, RegistryTarget, SecretToken};
pub use runtime::ContainerRuntime;
pub use telemetry::init_tracing;

/// eebuild version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

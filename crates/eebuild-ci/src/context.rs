//! Immutable per-run configuration, threaded through every stage.
//!
//! Stages never read the process environment; whatever they need is carried
//! here, assembled once by the caller.

use std::path::PathBuf;

use eebuild_core::manifest::DEFAULT_MANIFEST_FILE;
use eebuild_core::{ContainerRuntime, EventContext, RegistryCredential, RegistryTarget};
use uuid::Uuid;

/// Default destination tag for local builds.
pub const DEFAULT_IMAGE_TAG: &str = "localhost/ee-build:latest";
/// Default builder executable.
pub const DEFAULT_BUILDER: &str = "ansible-builder";
/// Default scanner executable.
pub const DEFAULT_SCANNER: &str = "trivy";
/// Scanner image used when the scanner binary is unavailable.
pub const DEFAULT_SCANNER_IMAGE: &str = "docker.io/aquasec/trivy:latest";
/// Fixed relative path of the vulnerability report.
pub const DEFAULT_REPORT_PATH: &str = "trivy-results.sarif";
/// Default sample workload.
pub const DEFAULT_PLAYBOOK: &str = "test-playbook.yml";
/// Modules every image must be able to import.
pub const DEFAULT_IMPORTS: &[&str] = &["ansible", "ansible_runner"];

/// Settings for the functional check battery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionalSuite {
    /// Collections that should be installed. Missing ones only warn.
    pub expected_collections: Vec<String>,

    /// Python modules that must import.
    pub imports: Vec<String>,

    /// Sample workload run inside the image.
    pub playbook: PathBuf,
}

impl Default for FunctionalSuite {
    fn default() -> Self {
        Self {
            expected_collections: Vec::new(),
            imports: DEFAULT_IMPORTS.iter().map(|m| m.to_string()).collect(),
            playbook: PathBuf::from(DEFAULT_PLAYBOOK),
        }
    }
}

impl FunctionalSuite {
    /// Add expected collections, skipping duplicates.
    pub fn expect_collections<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.expected_collections.contains(&name) {
                self.expected_collections.push(name);
            }
        }
        self
    }

    /// Add modules to the import check, skipping duplicates.
    pub fn with_imports<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for module in modules {
            let module = module.into();
            if !self.imports.contains(&module) {
                self.imports.push(module);
            }
        }
        self
    }

    pub fn with_playbook(mut self, playbook: impl Into<PathBuf>) -> Self {
        self.playbook = playbook.into();
        self
    }
}

/// Everything a run needs, fixed at startup.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub manifest_path: PathBuf,
    pub runtime: ContainerRuntime,

    /// Destination tag of the local build.
    pub image_tag: String,

    pub event: EventContext,
    pub registry: RegistryTarget,
    pub credential: Option<RegistryCredential>,
    pub suite: FunctionalSuite,
    pub report_path: PathBuf,
    pub builder_program: String,
    pub scanner_program: String,
    pub scanner_image: String,
    pub verbose: bool,
}

impl RunContext {
    pub fn new(registry: RegistryTarget) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            manifest_path: PathBuf::from(DEFAULT_MANIFEST_FILE),
            runtime: ContainerRuntime::default(),
            image_tag: DEFAULT_IMAGE_TAG.to_string(),
            event: EventContext::Manual,
            registry,
            credential: None,
            suite: FunctionalSuite::default(),
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
            builder_program: DEFAULT_BUILDER.to_string(),
            scanner_program: DEFAULT_SCANNER.to_string(),
            scanner_image: DEFAULT_SCANNER_IMAGE.to_string(),
            verbose: false,
        }
    }

    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = path.into();
        self
    }

    pub fn with_runtime(mut self, runtime: ContainerRuntime) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_image_tag(mut self, tag: impl Into<String>) -> Self {
        self.image_tag = tag.into();
        self
    }

    pub fn with_event(mut self, event: EventContext) -> Self {
        self.event = event;
        self
    }

    pub fn with_credential(mut self, credential: RegistryCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_suite(mut self, suite: FunctionalSuite) -> Self {
        self.suite = suite;
        self
    }

    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = path.into();
        self
    }

    pub fn with_builder_program(mut self, program: impl Into<String>) -> Self {
        self.builder_program = program.into();
        self
    }

    pub fn with_scanner_program(mut self, program: impl Into<String>) -> Self {
        self.scanner_program = program.into();
        self
    }

    pub fn with_scanner_image(mut self, image: impl Into<String>) -> Self {
        self.scanner_image = image.into();
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let ctx = RunContext::new(RegistryTarget::new("ghcr.io", "acme/ee"));
        assert_eq!(ctx.image_tag, DEFAULT_IMAGE_TAG);
        assert_eq!(ctx.runtime, ContainerRuntime::Podman);
        assert_eq!(ctx.event, EventContext::Manual);
        assert_eq!(ctx.report_path, PathBuf::from("trivy-results.sarif"));
        assert_eq!(ctx.suite.imports, vec!["ansible", "ansible_runner"]);
        assert!(ctx.credential.is_none());
    }

    #[test]
    fn test_suite_additions_are_deduplicated() {
        let suite = FunctionalSuite::default()
            .expect_collections(["community.general", "ansible.utils"])
            .expect_collections(["community.general"])
            .with_imports(["ansible", "jmespath"]);
        assert_eq!(suite.expected_collections, vec!["community.general", "ansible.utils"]);
        assert_eq!(suite.imports, vec!["ansible", "ansible_runner", "jmespath"]);
    }
}

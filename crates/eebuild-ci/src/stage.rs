//! Pipeline stage definitions and plans.

use serde::{Deserialize, Serialize};

/// The pipeline's stages, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Structural manifest checks plus the builder's dry run.
    Validate,

    /// Image build, cache disabled.
    Build,

    /// Functional smoke checks against the image.
    Test,

    /// Vulnerability scan. Never fatal.
    Scan,

    /// Tag set and publish decision from the trigger event.
    Tag,

    /// Registry login, then tag and push each reference.
    Publish,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Validate,
        Stage::Build,
        Stage::Test,
        Stage::Scan,
        Stage::Tag,
        Stage::Publish,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Build => "build",
            Stage::Test => "test",
            Stage::Scan => "scan",
            Stage::Tag => "tag",
            Stage::Publish => "publish",
        }
    }

    /// Whether a failure in this stage halts the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Stage::Scan)
    }

    /// Whether this stage needs a built (or already present) image.
    pub fn needs_image(&self) -> bool {
        matches!(self, Stage::Test | Stage::Scan | Stage::Publish)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A stage and whether it runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageConfig {
    pub stage: Stage,
    pub enabled: bool,
}

impl StageConfig {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            enabled: true,
        }
    }

    /// Disable this stage.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Which stages a run executes. Order is always [`Stage::ALL`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    configs: Vec<StageConfig>,
}

impl StagePlan {
    /// Enable exactly `stages`.
    pub fn only(stages: &[Stage]) -> Self {
        let configs = Stage::ALL
            .iter()
            .map(|s| {
                let config = StageConfig::new(*s);
                if stages.contains(s) {
                    config
                } else {
                    config.disabled()
                }
            })
            .collect();
        Self { configs }
    }

    /// Every stage, including tag computation and publish.
    pub fn full() -> Self {
        Self::only(&Stage::ALL)
    }

    /// Local check run: validate, build, test, scan.
    pub fn local() -> Self {
        Self::only(&[Stage::Validate, Stage::Build, Stage::Test, Stage::Scan])
    }

    pub fn is_enabled(&self, stage: Stage) -> bool {
        self.configs.iter().any(|c| c.stage == stage && c.enabled)
    }

    pub fn enabled(&self) -> impl Iterator<Item = Stage> + '_ {
        self.configs.iter().filter(|c| c.enabled).map(|c| c.stage)
    }

    pub fn configs(&self) -> &[StageConfig] {
        &self.configs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        let names: Vec<_> = Stage::ALL.iter().map(Stage::name).collect();
        assert_eq!(names, vec!["validate", "build", "test", "scan", "tag", "publish"]);
    }

    #[test]
    fn test_only_scan_is_non_fatal() {
        for stage in Stage::ALL {
            assert_eq!(stage.is_fatal(), stage != Stage::Scan);
        }
    }

    #[test]
    fn test_plan_keeps_pipeline_order() {
        let plan = StagePlan::only(&[Stage::Scan, Stage::Validate]);
        assert_eq!(plan.enabled().collect::<Vec<_>>(), vec![Stage::Validate, Stage::Scan]);
        assert_eq!(plan.configs().len(), 6);
    }

    #[test]
    fn test_local_plan_excludes_publish() {
        let plan = StagePlan::local();
        assert!(plan.is_enabled(Stage::Test));
        assert!(!plan.is_enabled(Stage::Tag));
        assert!(!plan.is_enabled(Stage::Publish));
        assert!(StagePlan::full().is_enabled(Stage::Publish));
    }

    #[test]
    fn test_stage_config_disabled() {
        let config = StageConfig::new(Stage::Build).disabled();
        assert!(!config.enabled);
    }
}

//! Functional smoke checks against a built image.
//!
//! The battery is fixed and ordered. Every check runs regardless of earlier
//! failures; [`crate::gate::FunctionalGate`] decides the overall verdict.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use eebuild_core::emit_check_finished;

use crate::builder::BuildArtifact;
use crate::context::FunctionalSuite;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};

/// Mount point of the sample workload inside the container.
pub const PROJECT_MOUNT: &str = "/runner/project";

/// The checks, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionalCheck {
    /// `ansible --version` must exit zero.
    AnsibleVersion,
    /// `python3 --version`, informational.
    PythonVersion,
    /// `ansible-galaxy collection list` must exit zero.
    CollectionList,
    /// Expected collections appear in the listing; missing ones warn.
    ExpectedCollections,
    /// Every configured module imports.
    PythonImports,
    /// The sample playbook runs to completion.
    SampleWorkload,
}

impl FunctionalCheck {
    pub const ALL: [FunctionalCheck; 6] = [
        FunctionalCheck::AnsibleVersion,
        FunctionalCheck::PythonVersion,
        FunctionalCheck::CollectionList,
        FunctionalCheck::ExpectedCollections,
        FunctionalCheck::PythonImports,
        FunctionalCheck::SampleWorkload,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FunctionalCheck::AnsibleVersion => "ansible_version",
            FunctionalCheck::PythonVersion => "python_version",
            FunctionalCheck::CollectionList => "collection_list",
            FunctionalCheck::ExpectedCollections => "expected_collections",
            FunctionalCheck::PythonImports => "python_imports",
            FunctionalCheck::SampleWorkload => "sample_workload",
        }
    }

    /// Hard checks fail the run; soft checks only log.
    pub fn is_hard(&self) -> bool {
        !matches!(
            self,
            FunctionalCheck::PythonVersion | FunctionalCheck::ExpectedCollections
        )
    }
}

impl std::fmt::Display for FunctionalCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: FunctionalCheck,
    pub passed: bool,

    /// Captured command output.
    pub output: String,

    /// Human-readable summary of the outcome.
    pub detail: String,

    /// Items responsible for a failure (missing collections, failed imports).
    pub failed_items: Vec<String>,
}

impl CheckResult {
    fn pass(check: FunctionalCheck, output: String, detail: impl Into<String>) -> Self {
        Self {
            check,
            passed: true,
            output,
            detail: detail.into(),
            failed_items: Vec::new(),
        }
    }

    fn fail(check: FunctionalCheck, output: String, detail: impl Into<String>) -> Self {
        Self {
            check,
            passed: false,
            output,
            detail: detail.into(),
            failed_items: Vec::new(),
        }
    }

    fn with_failed_items(mut self, items: Vec<String>) -> Self {
        self.failed_items = items;
        self
    }
}

/// All check results of one run, in battery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub results: Vec<CheckResult>,
}

impl TestReport {
    pub fn get(&self, check: FunctionalCheck) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.check == check)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }
}

fn run_in_image(artifact: &BuildArtifact, command: &[&str]) -> CommandSpec {
    CommandSpec::new(artifact.runtime.program())
        .args(["run", "--rm"])
        .arg(&artifact.image)
        .args(command.iter().copied())
}

fn combined(output: &CommandOutput) -> String {
    let mut text = output.stdout.clone();
    if !output.stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&output.stderr);
    }
    text
}

/// Run a command that must exit zero.
async fn exit_zero_check(
    runner: &dyn CommandRunner,
    check: FunctionalCheck,
    spec: CommandSpec,
) -> CheckResult {
    match runner.run(&spec).await {
        Ok(output) if output.success() => {
            let first_line = output.stdout.lines().next().unwrap_or_default().to_string();
            CheckResult::pass(check, combined(&output), first_line)
        }
        Ok(output) => CheckResult::fail(
            check,
            combined(&output),
            format!("exited with code {}: {}", output.exit_code, output.diagnostic()),
        ),
        Err(e) => CheckResult::fail(check, String::new(), format!("failed to start: {e}")),
    }
}

/// Collection names from `ansible-galaxy collection list` output.
pub fn installed_collections(listing: &str) -> BTreeSet<String> {
    listing
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| {
            let mut parts = name.split('.');
            matches!(
                (parts.next(), parts.next(), parts.next()),
                (Some(a), Some(b), None) if !a.is_empty() && !b.is_empty()
            )
        })
        .map(str::to_string)
        .collect()
}

fn expected_collections_check(listing: &str, expected: &[String]) -> CheckResult {
    let check = FunctionalCheck::ExpectedCollections;
    let installed = installed_collections(listing);
    let missing: Vec<String> = expected
        .iter()
        .filter(|name| !installed.contains(name.as_str()))
        .cloned()
        .collect();

    if missing.is_empty() {
        CheckResult::pass(
            check,
            String::new(),
            format!("{} expected collection(s) present", expected.len()),
        )
    } else {
        CheckResult::fail(
            check,
            String::new(),
            format!("missing collections: {}", missing.join(", ")),
        )
        .with_failed_items(missing)
    }
}

async fn python_imports_check(
    runner: &dyn CommandRunner,
    artifact: &BuildArtifact,
    modules: &[String],
) -> CheckResult {
    let check = FunctionalCheck::PythonImports;
    let mut failed = Vec::new();
    let mut output = String::new();

    for module in modules {
        let statement = format!("import {module}");
        let spec = run_in_image(artifact, &["python3", "-c", &statement]);
        match runner.run(&spec).await {
            Ok(out) if out.success() => output.push_str(&format!("{module}: ok\n")),
            Ok(out) => {
                output.push_str(&format!("{module}: {}\n", out.diagnostic()));
                failed.push(module.clone());
            }
            Err(e) => {
                output.push_str(&format!("{module}: failed to start: {e}\n"));
                failed.push(module.clone());
            }
        }
    }

    if failed.is_empty() {
        CheckResult::pass(check, output, format!("{} module(s) imported", modules.len()))
    } else {
        CheckResult::fail(check, output, format!("failed imports: {}", failed.join(", ")))
            .with_failed_items(failed)
    }
}

async fn sample_workload_check(
    runner: &dyn CommandRunner,
    artifact: &BuildArtifact,
    playbook: &Path,
) -> CheckResult {
    let check = FunctionalCheck::SampleWorkload;

    let resolved = match std::fs::canonicalize(playbook) {
        Ok(path) if path.is_file() => path,
        _ => {
            return CheckResult::fail(
                check,
                String::new(),
                format!("playbook {} not found", playbook.display()),
            )
        }
    };
    let (Some(dir), Some(file)) = (resolved.parent(), resolved.file_name()) else {
        return CheckResult::fail(
            check,
            String::new(),
            format!("playbook {} has no parent directory", resolved.display()),
        );
    };

    let spec = CommandSpec::new(artifact.runtime.program())
        .args(["run", "--rm", "-v"])
        .arg(format!("{}:{}:ro", dir.display(), PROJECT_MOUNT))
        .args(["-w", PROJECT_MOUNT])
        .arg(&artifact.image)
        .args(["ansible-playbook", "-i", "localhost,", "-c", "local"])
        .arg(file.to_string_lossy());

    exit_zero_check(runner, check, spec).await
}

/// Run the whole battery against `artifact`.
pub async fn run_functional_suite(
    runner: &dyn CommandRunner,
    artifact: &BuildArtifact,
    suite: &FunctionalSuite,
) -> TestReport {
    let mut results = Vec::with_capacity(FunctionalCheck::ALL.len());

    results.push(
        exit_zero_check(
            runner,
            FunctionalCheck::AnsibleVersion,
            run_in_image(artifact, &["ansible", "--version"]),
        )
        .await,
    );

    let python = exit_zero_check(
        runner,
        FunctionalCheck::PythonVersion,
        run_in_image(artifact, &["python3", "--version"]),
    )
    .await;
    if python.passed {
        info!(python = %python.output.trim(), "Interpreter version");
    }
    results.push(python);

    let listing = exit_zero_check(
        runner,
        FunctionalCheck::CollectionList,
        run_in_image(artifact, &["ansible-galaxy", "collection", "list"]),
    )
    .await;
    let expected = expected_collections_check(&listing.output, &suite.expected_collections);
    results.push(listing);
    results.push(expected);

    results.push(python_imports_check(runner, artifact, &suite.imports).await);
    results.push(sample_workload_check(runner, artifact, &suite.playbook).await);

    for result in &results {
        emit_check_finished(
            result.check.name(),
            result.check.is_hard(),
            result.passed,
            &result.detail,
        );
    }

    TestReport { results }
}

//! The trigger that started a pipeline run.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PipelineError;

/// Which trigger fired the run. Supplied once at startup, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventContext {
    /// A published release, carrying its tag (e.g. `v1.4.0`).
    Release { tag: String },
    /// A push to the default branch.
    DefaultBranchPush,
    /// A pull request, by number.
    PullRequest { number: u64 },
    /// A manual run, a local run, or any trigger not recognised above.
    Manual,
}

impl EventContext {
    /// Release event. The tag becomes an image tag, so it must match
    /// `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`.
    pub fn release(tag: impl Into<String>) -> Result<Self, PipelineError> {
        let tag = tag.into();
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::Config("release tag must not be empty".into()));
        }
        if !is_image_tag(trimmed) {
            return Err(PipelineError::Config(format!(
                "release tag '{trimmed}' is not a valid image tag"
            )));
        }
        Ok(EventContext::Release {
            tag: trimmed.to_string(),
        })
    }

    /// Classify a run from GitHub Actions style variables.
    ///
    /// `lookup` returns the value of a variable; the caller decides where
    /// variables come from, so this stays free of process-global reads.
    ///
    /// - `release` uses `GITHUB_REF_NAME` as the release tag
    /// - `push` to `refs/heads/<default_branch>` is a default-branch push
    /// - `pull_request` / `pull_request_target` read the number from
    ///   `GITHUB_REF` (`refs/pull/<n>/merge`)
    /// - everything else is [`EventContext::Manual`]
    pub fn from_ci_env<F>(lookup: F, default_branch: &str) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let event_name = lookup("GITHUB_EVENT_NAME").unwrap_or_default();
        let git_ref = lookup("GITHUB_REF").unwrap_or_default();

        match event_name.as_str() {
            "release" => {
                let tag = lookup("GITHUB_REF_NAME")
                    .or_else(|| git_ref.strip_prefix("refs/tags/").map(str::to_string))
                    .unwrap_or_default();
                Self::release(tag)
            }
            "push" if git_ref == format!("refs/heads/{default_branch}") => {
                Ok(EventContext::DefaultBranchPush)
            }
            "pull_request" | "pull_request_target" => {
                let number = parse_pull_number(&git_ref).ok_or_else(|| {
                    PipelineError::Config(format!(
                        "cannot read pull request number from GITHUB_REF '{git_ref}'"
                    ))
                })?;
                Ok(EventContext::PullRequest { number })
            }
            "" | "push" | "workflow_dispatch" => Ok(EventContext::Manual),
            other => {
                warn!(event_name = %other, "Unrecognised trigger, treating as manual run");
                Ok(EventContext::Manual)
            }
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        match self {
            EventContext::Release { tag } => format!("release:{tag}"),
            EventContext::DefaultBranchPush => "default-branch-push".to_string(),
            EventContext::PullRequest { number } => format!("pull-request:{number}"),
            EventContext::Manual => "manual".to_string(),
        }
    }
}

fn is_image_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    tag.len() <= 128
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn parse_pull_number(git_ref: &str) -> Option<u64> {
    git_ref
        .strip_prefix("refs/pull/")?
        .split('/')
        .next()?
        .parse()
        .ok()
}

//! Registry publish: login, then tag and push each reference in order.

use eebuild_core::{PipelineError, RegistryCredential, RegistryTarget, Result, TagSet};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::builder::BuildArtifact;
use crate::runner::{CommandRunner, CommandSpec};

/// References pushed by a publish, in push order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    pub pushed: Vec<String>,
}

/// Log in to `target.registry` and push every tag in `tags`, in order.
///
/// The token reaches the engine through stdin only. The first failed tag or
/// push returns [`PipelineError::Publish`] naming that reference; later
/// references are not attempted and earlier pushes are not undone.
pub async fn publish(
    runner: &dyn CommandRunner,
    artifact: &BuildArtifact,
    tags: &TagSet,
    target: &RegistryTarget,
    credential: Option<&RegistryCredential>,
) -> Result<PublishReport> {
    let credential = credential.ok_or_else(|| {
        PipelineError::Config(format!(
            "publishing to {} requires registry credentials",
            target.registry
        ))
    })?;
    if credential.username.trim().is_empty() || credential.token.is_empty() {
        return Err(PipelineError::Config(format!(
            "registry credentials for {} are incomplete",
            target.registry
        )));
    }

    let program = artifact.runtime.program();
    login(runner, program, target, credential).await?;

    let mut report = PublishReport::default();
    for reference in tags {
        let tag = CommandSpec::new(program)
            .arg("tag")
            .arg(&artifact.image)
            .arg(reference);
        run_step(runner, &tag, reference).await?;

        let push = CommandSpec::new(program).arg("push").arg(reference);
        run_step(runner, &push, reference).await?;

        info!(reference = %reference, "Pushed");
        report.pushed.push(reference.clone());
    }

    Ok(report)
}

async fn login(
    runner: &dyn CommandRunner,
    program: &str,
    target: &RegistryTarget,
    credential: &RegistryCredential,
) -> Result<()> {
    let spec = CommandSpec::new(program)
        .arg("login")
        .arg(&target.registry)
        .arg("--username")
        .arg(&credential.username)
        .arg("--password-stdin")
        .stdin(credential.token.expose());

    let tool_error = |reason: String| PipelineError::Tool {
        tool: program.to_string(),
        reason,
    };
    let output = runner
        .run(&spec)
        .await
        .map_err(|e| tool_error(format!("login failed to start: {e}")))?;
    if !output.success() {
        return Err(tool_error(format!(
            "login to {} failed: {}",
            target.registry,
            output.diagnostic()
        )));
    }
    info!(registry = %target.registry, username = %credential.username, "Logged in");
    Ok(())
}

async fn run_step(runner: &dyn CommandRunner, spec: &CommandSpec, reference: &str) -> Result<()> {
    let publish_error = |reason: String| PipelineError::Publish {
        tag: reference.to_string(),
        reason,
    };
    let output = runner
        .run(spec)
        .await
        .map_err(|e| publish_error(format!("{} failed to start: {e}", spec.program)))?;
    if output.success() {
        Ok(())
    } else {
        Err(publish_error(format!(
            "`{}` exited with code {}: {}",
            spec.display_line(),
            output.exit_code,
            output.diagnostic()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{ScriptedResponse, ScriptedRunner};
    use eebuild_core::{ContainerRuntime, SecretToken};

    fn artifact() -> BuildArtifact {
        BuildArtifact {
            image: "localhost/ee-build:latest".into(),
            runtime: ContainerRuntime::Podman,
            image_id: "sha256:1".into(),
            manifest_digest: None,
        }
    }

    fn target() -> RegistryTarget {
        RegistryTarget::new("ghcr.io", "acme/ee")
    }

    fn credential() -> RegistryCredential {
        RegistryCredential {
            username: "bot".into(),
            token: SecretToken::new("s3cr3t"),
        }
    }

    fn tags() -> TagSet {
        TagSet::from_references(["ghcr.io/acme/ee:v1", "ghcr.io/acme/ee:latest"]).unwrap()
    }

    #[tokio::test]
    async fn test_token_goes_through_stdin_only() {
        let runner = ScriptedRunner::new();
        let report = publish(&runner, &artifact(), &tags(), &target(), Some(&credential()))
            .await
            .unwrap();
        assert_eq!(report.pushed, tags().as_slice());

        let calls = runner.calls();
        assert_eq!(calls[0].stdin.as_deref(), Some("s3cr3t"));
        assert!(calls.iter().all(|c| !c.args.iter().any(|a| a.contains("s3cr3t"))));
        assert_eq!(
            runner.command_lines()[1..],
            [
                "podman tag localhost/ee-build:latest ghcr.io/acme/ee:v1",
                "podman push ghcr.io/acme/ee:v1",
                "podman tag localhost/ee-build:latest ghcr.io/acme/ee:latest",
                "podman push ghcr.io/acme/ee:latest",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_credential_is_config_error_before_any_command() {
        let runner = ScriptedRunner::new();
        let err = publish(&runner, &artifact(), &tags(), &target(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_login_failure_is_tool_error() {
        let runner =
            ScriptedRunner::new().on(&["login"], ScriptedResponse::exit(1, "unauthorized"));
        let err = publish(&runner, &artifact(), &tags(), &target(), Some(&credential()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "tool");
        assert!(runner.calls_containing("push").is_empty());
    }

    #[tokio::test]
    async fn test_tag_failure_names_reference() {
        let runner = ScriptedRunner::new().on(
            &["tag", "localhost/ee-build:latest", "ghcr.io/acme/ee:v1"],
            ScriptedResponse::exit(125, "no such image"),
        );
        let err = publish(&runner, &artifact(), &tags(), &target(), Some(&credential()))
            .await
            .unwrap_err();
        match err {
            PipelineError::Publish { tag, .. } => assert_eq!(tag, "ghcr.io/acme/ee:v1"),
            other => panic!("expected Publish error, got {other:?}"),
        }
        assert!(runner.calls_containing("push").is_empty());
    }
}

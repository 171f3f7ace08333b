//! Image build through the external builder.

use eebuild_core::{ContainerRuntime, LoadedManifest, ManifestDigest, PipelineError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::RunContext;
use crate::runner::{CommandRunner, CommandSpec};

/// Handle to a built image, consumed by every later stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    /// Local image reference, e.g. `localhost/ee-build:latest`.
    pub image: String,

    /// Engine that holds the image.
    pub runtime: ContainerRuntime,

    /// Image id reported by the engine.
    pub image_id: String,

    /// Digest of the manifest the image was built from; `None` for images
    /// that already existed.
    pub manifest_digest: Option<ManifestDigest>,
}

/// Build the image. Caching is always disabled; there are no retries.
///
/// A non-zero builder exit is [`PipelineError::Build`] with the builder's
/// output verbatim.
pub async fn build_image(
    runner: &dyn CommandRunner,
    ctx: &RunContext,
    loaded: &LoadedManifest,
) -> Result<BuildArtifact> {
    let mut spec = CommandSpec::new(&ctx.builder_program)
        .arg("build")
        .arg("--file")
        .arg(loaded.path.to_string_lossy())
        .arg("--tag")
        .arg(&ctx.image_tag)
        .arg("--container-runtime")
        .arg(ctx.runtime.program())
        .arg("--no-cache");
    if ctx.verbose {
        spec = spec.args(["--verbosity", "3"]);
    }

    info!(
        image = %ctx.image_tag,
        runtime = %ctx.runtime,
        digest = %loaded.digest.short(),
        "Building image"
    );

    let output = runner.run(&spec).await.map_err(|e| {
        PipelineError::Build(format!("{} failed to start: {e}", ctx.builder_program))
    })?;

    if !output.success() {
        let verbatim = if output.stderr.trim().is_empty() {
            output.stdout
        } else {
            output.stderr
        };
        return Err(PipelineError::Build(format!(
            "{} exited with code {}:\n{}",
            ctx.builder_program, output.exit_code, verbatim
        )));
    }

    let image_id = inspect_image_id(runner, ctx.runtime, &ctx.image_tag)
        .await
        .map_err(PipelineError::Build)?;

    info!(
        image = %ctx.image_tag,
        image_id = %image_id,
        duration_ms = output.duration_ms,
        "Image built"
    );

    Ok(BuildArtifact {
        image: ctx.image_tag.clone(),
        runtime: ctx.runtime,
        image_id,
        manifest_digest: Some(loaded.digest.clone()),
    })
}

/// Artifact for an image that is already present in the engine (runs that
/// skip the build stage).
pub async fn resolve_existing_image(
    runner: &dyn CommandRunner,
    ctx: &RunContext,
) -> Result<BuildArtifact> {
    let image_id = inspect_image_id(runner, ctx.runtime, &ctx.image_tag)
        .await
        .map_err(|reason| PipelineError::Tool {
            tool: ctx.runtime.program().to_string(),
            reason,
        })?;

    Ok(BuildArtifact {
        image: ctx.image_tag.clone(),
        runtime: ctx.runtime,
        image_id,
        manifest_digest: None,
    })
}

async fn inspect_image_id(
    runner: &dyn CommandRunner,
    runtime: ContainerRuntime,
    image: &str,
) -> std::result::Result<String, String> {
    let spec = CommandSpec::new(runtime.program())
        .args(["image", "inspect", "--format", "{{.Id}}"])
        .arg(image);

    let output = runner
        .run(&spec)
        .await
        .map_err(|e| format!("{} failed to start: {e}", runtime.program()))?;

    let id = output.stdout.trim();
    if !output.success() || id.is_empty() {
        return Err(format!(
            "image {image} not found in {}: {}",
            runtime.program(),
            output.diagnostic()
        ));
    }
    Ok(id.to_string())
}

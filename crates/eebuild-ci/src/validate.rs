//! Manifest validation: structural checks, then the builder's dry run.

use eebuild_core::manifest::{COLLECTION_KINDS, SUPPORTED_VERSION};
use eebuild_core::{LoadedManifest, Manifest, ManifestError, PipelineError, Result};
use tracing::{debug, info};

use crate::context::RunContext;
use crate::runner::{CommandRunner, CommandSpec};

/// Every structural problem in `manifest`. Empty when well-formed.
pub fn structural_problems(manifest: &Manifest) -> Vec<String> {
    let mut problems = Vec::new();

    if manifest.version != SUPPORTED_VERSION {
        problems.push(format!(
            "version {} is not supported (expected {})",
            manifest.version, SUPPORTED_VERSION
        ));
    }

    if manifest.images.base_image.name.trim().is_empty() {
        problems.push("images.base_image.name must not be empty".to_string());
    }

    let deps = &manifest.dependencies;
    if let Some(path) = deps
        .python_interpreter
        .as_ref()
        .and_then(|p| p.python_path.as_deref())
    {
        if !path.starts_with('/') {
            problems.push(format!(
                "dependencies.python_interpreter.python_path '{path}' must be absolute"
            ));
        }
    }

    match &deps.ansible_core {
        Some(pkg) if !pkg.package_pip.trim().is_empty() => {}
        _ => problems.push("dependencies.ansible_core.package_pip is required".to_string()),
    }
    if let Some(pkg) = &deps.ansible_runner {
        if pkg.package_pip.trim().is_empty() {
            problems.push("dependencies.ansible_runner.package_pip must not be empty".to_string());
        }
    }

    for collection in &deps.galaxy.collections {
        if !is_qualified_collection_name(&collection.name) {
            problems.push(format!(
                "collection '{}' is not of the form namespace.name",
                collection.name
            ));
        }
        if let Some(kind) = &collection.kind {
            if !COLLECTION_KINDS.contains(&kind.as_str()) {
                problems.push(format!(
                    "collection '{}' has unknown type '{}'",
                    collection.name, kind
                ));
            }
        }
    }

    for (i, role) in deps.galaxy.roles.iter().enumerate() {
        let named = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if !named(&role.name) && !named(&role.src) {
            problems.push(format!("galaxy role #{} needs a name or src", i + 1));
        }
    }

    for file in &manifest.additional_build_files {
        if file.src.trim().is_empty() || file.dest.trim().is_empty() {
            problems.push("additional_build_files entries need both src and dest".to_string());
        }
    }

    for package in &deps.system.packages {
        for selector in &package.selectors {
            if !selector
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.' | '-' | '!'))
            {
                problems.push(format!(
                    "system package '{}' has invalid selector '{}'",
                    package.name, selector
                ));
            }
        }
    }

    for (section, step) in manifest.additional_build_steps.iter() {
        if step.trim().is_empty() {
            problems.push(format!("additional_build_steps.{section} contains an empty step"));
        }
    }

    problems
}

fn is_qualified_collection_name(name: &str) -> bool {
    let mut parts = name.split('.');
    let valid = |p: &str| {
        !p.is_empty()
            && p.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !p.starts_with(|c: char| c.is_ascii_digit())
    };
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(ns), Some(n), None) if valid(ns) && valid(n)
    )
}

/// Validate a loaded manifest.
///
/// Structural problems fail with [`PipelineError::Config`] listing all of
/// them. The builder is then asked to generate a build context into a
/// throwaway directory; a rejection or spawn failure is
/// [`PipelineError::Tool`].
pub async fn validate_manifest(
    runner: &dyn CommandRunner,
    ctx: &RunContext,
    loaded: &LoadedManifest,
) -> Result<()> {
    let problems = structural_problems(&loaded.manifest);
    if !problems.is_empty() {
        return Err(ManifestError::Invalid(problems).into());
    }
    debug!(manifest = %loaded.path.display(), "Manifest structure is valid");

    let scratch = tempfile::tempdir().map_err(|e| PipelineError::Tool {
        tool: ctx.builder_program.clone(),
        reason: format!("cannot create scratch context directory: {e}"),
    })?;

    let spec = CommandSpec::new(&ctx.builder_program)
        .arg("create")
        .arg("--file")
        .arg(loaded.path.to_string_lossy())
        .arg("--context")
        .arg(scratch.path().to_string_lossy())
        .arg("--container-runtime")
        .arg(ctx.runtime.program());

    let output = runner.run(&spec).await.map_err(|e| PipelineError::Tool {
        tool: ctx.builder_program.clone(),
        reason: format!("failed to start: {e}"),
    })?;

    if !output.success() {
        return Err(PipelineError::Tool {
            tool: ctx.builder_program.clone(),
            reason: format!(
                "rejected manifest (exit code {}): {}",
                output.exit_code,
                output.diagnostic()
            ),
        });
    }

    info!(
        manifest = %loaded.path.display(),
        digest = %loaded.digest.short(),
        "Manifest accepted by builder"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{ScriptedResponse, ScriptedRunner};

    fn manifest(text: &str) -> Manifest {
        Manifest::from_yaml_str(text).unwrap()
    }

    const VALID: &str = "version: 3\nimages:\n  base_image:\n    name: quay.io/centos/centos:stream9\ndependencies:\n  ansible_core:\n    package_pip: ansible-core\n  galaxy: |\n    collections:\n      - name: community.general\n  system: |\n    gcc [platform:rpm compile]\n";

    #[test]
    fn test_valid_manifest_has_no_problems() {
        assert!(structural_problems(&manifest(VALID)).is_empty());
    }

    #[test]
    fn test_every_problem_is_reported() {
        let text = VALID
            .replace("version: 3", "version: 1")
            .replace("community.general", "general")
            .replace("  ansible_core:\n    package_pip: ansible-core\n", "");
        let problems = structural_problems(&manifest(&text));
        assert_eq!(problems.len(), 3, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("version 1")));
        assert!(problems.iter().any(|p| p.contains("'general'")));
        assert!(problems.iter().any(|p| p.contains("ansible_core")));
    }

    #[test]
    fn test_relative_interpreter_path_rejected() {
        let text = VALID.replace(
            "dependencies:\n",
            "dependencies:\n  python_interpreter:\n    python_path: bin/python3\n",
        );
        let problems = structural_problems(&manifest(&text));
        assert!(problems[0].contains("must be absolute"));
    }

    #[test]
    fn test_builder_only_keys_pass_structural_checks() {
        let text = VALID.replace(
            "      - name: community.general\n",
            "      - community.general\n    roles:\n      - geerlingguy.java\n",
        ) + concat!(
            "additional_build_files:\n",
            "  - src: files/ansible.cfg\n",
            "    dest: configs\n",
            "options:\n",
            "  user: \"1000\"\n",
            "  container_init:\n",
            "    cmd: '[\"bash\"]'\n",
        );
        assert_eq!(structural_problems(&manifest(&text)), Vec::<String>::new());
    }

    #[test]
    fn test_anonymous_role_rejected() {
        let text = VALID.replace(
            "      - name: community.general\n",
            "      - name: community.general\n    roles:\n      - version: 1.0.0\n",
        );
        let problems = structural_problems(&manifest(&text));
        assert_eq!(problems, vec!["galaxy role #1 needs a name or src"]);
    }

    #[test]
    fn test_bad_selector_rejected() {
        let text = VALID.replace("[platform:rpm compile]", "[platform:rpm comp$le]");
        let problems = structural_problems(&manifest(&text));
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("comp$le"));
    }

    fn loaded(text: &str) -> (tempfile::NamedTempFile, LoadedManifest) {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        let loaded = LoadedManifest::load(file.path()).unwrap();
        (file, loaded)
    }

    fn ctx() -> RunContext {
        RunContext::new(eebuild_core::RegistryTarget::new("ghcr.io", "acme/ee"))
    }

    #[tokio::test]
    async fn test_structural_failure_runs_no_tool() {
        let (_file, loaded) = loaded(&VALID.replace("version: 3", "version: 2"));
        let runner = ScriptedRunner::new();
        let err = validate_manifest(&runner, &ctx(), &loaded).await.unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_uses_scratch_context() {
        let (_file, loaded) = loaded(VALID);
        let runner = ScriptedRunner::new();
        validate_manifest(&runner, &ctx(), &loaded).await.unwrap();

        let call = &runner.calls()[0];
        assert_eq!(call.program, "ansible-builder");
        assert_eq!(call.args[0], "create");
        let context_dir = &call.args[4];
        assert!(!std::path::Path::new(context_dir).exists(), "scratch dir removed");
        assert!(runner.command_lines()[0].ends_with("--container-runtime podman"));
    }

    #[tokio::test]
    async fn test_builder_rejection_is_tool_error() {
        let (_file, loaded) = loaded(VALID);
        let runner = ScriptedRunner::new().on(
            &["create"],
            ScriptedResponse::exit(1, "'dependencies' has unexpected key"),
        );
        match validate_manifest(&runner, &ctx(), &loaded).await.unwrap_err() {
            PipelineError::Tool { tool, reason } => {
                assert_eq!(tool, "ansible-builder");
                assert!(reason.contains("unexpected key"));
            }
            other => panic!("expected Tool error, got {other:?}"),
        }
    }

    #[test]
    fn test_collection_names() {
        assert!(is_qualified_collection_name("community.general"));
        assert!(is_qualified_collection_name("acme_corp.tools_2"));
        assert!(!is_qualified_collection_name("community"));
        assert!(!is_qualified_collection_name("a.b.c"));
        assert!(!is_qualified_collection_name("1acme.tools"));
        assert!(!is_qualified_collection_name("acme-corp.tools"));
    }
}

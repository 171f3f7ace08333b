//! eebuild - execution environment build pipeline CLI
//!
//! The `eebuild` command validates, builds, smoke-tests, scans and publishes
//! a container execution environment described by a manifest.
//!
//! ## Commands
//!
//! - `validate`: structural checks plus the builder's dry run
//! - `build`: build the image (cache disabled)
//! - `test`: functional smoke checks against the image
//! - `scan`: vulnerability scan, never fatal
//! - `tags`: print the tag set and publish decision for the trigger event
//! - `all`: validate, build, test, scan (default)
//! - `ci`: the full pipeline, including tagging and publishing

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};

use eebuild_ci::context::{
    DEFAULT_BUILDER, DEFAULT_IMAGE_TAG, DEFAULT_PLAYBOOK, DEFAULT_REPORT_PATH, DEFAULT_SCANNER,
    DEFAULT_SCANNER_IMAGE,
};
use eebuild_ci::{
    write_run_report, FunctionalSuite, Pipeline, PipelineResult, ProcessRunner, RunContext,
    RunReportArtifact, Stage, StagePlan, StageStatus,
};
use eebuild_core::manifest::DEFAULT_MANIFEST_FILE;
use eebuild_core::registry::DEFAULT_REGISTRY;
use eebuild_core::{
    compute_tag_policy, ContainerRuntime, EventContext, RegistryCredential, RegistryTarget,
    SecretToken,
};

/// Image name used for local runs when no registry image is configured.
const LOCAL_IMAGE_NAME: &str = "ee-build";

#[derive(Parser)]
#[command(name = "eebuild")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build, test, scan and publish execution environment images", long_about = None)]
struct Cli {
    /// Enable verbose output (also raises the builder's verbosity)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Check the manifest and run the builder's dry run
    Validate,
    /// Build the image
    Build,
    /// Run the functional smoke checks against the image
    Test,
    /// Scan the image for vulnerabilities
    Scan,
    /// Print the tag set computed for the trigger event
    Tags,
    /// Validate, build, test and scan
    All,
    /// Full pipeline: validate, build, test, scan, tag, publish
    Ci,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Manifest file
    #[arg(short, long, global = true, env = "EEBUILD_FILE", default_value = DEFAULT_MANIFEST_FILE)]
    file: PathBuf,

    /// Container engine (podman or docker)
    #[arg(long, global = true, env = "EEBUILD_RUNTIME", default_value = "podman")]
    runtime: ContainerRuntime,

    /// Local image tag to build and test
    #[arg(short, long, global = true, env = "EEBUILD_TAG", default_value = DEFAULT_IMAGE_TAG)]
    tag: String,

    /// Sample playbook run inside the image
    #[arg(long, global = true, default_value = DEFAULT_PLAYBOOK)]
    playbook: PathBuf,

    /// Collection expected in the image, in addition to the manifest's (repeatable)
    #[arg(long = "expect-collection", global = true)]
    expect_collections: Vec<String>,

    /// Python module that must import inside the image (repeatable)
    #[arg(long = "import", global = true)]
    imports: Vec<String>,

    /// SARIF report path
    #[arg(long, global = true, default_value = DEFAULT_REPORT_PATH)]
    report: PathBuf,

    /// Write a JSON run report to this path
    #[arg(long, global = true)]
    run_report: Option<PathBuf>,

    /// Registry host for published images
    #[arg(long, global = true, env = "EEBUILD_REGISTRY", default_value = DEFAULT_REGISTRY)]
    registry: String,

    /// Repository path in the registry (defaults to GITHUB_REPOSITORY)
    #[arg(long, global = true, env = "EEBUILD_IMAGE")]
    image: Option<String>,

    /// Trigger event; `auto` reads the CI environment
    #[arg(long, global = true, env = "EEBUILD_EVENT", value_enum, default_value_t = EventArg::Auto)]
    event: EventArg,

    /// Release tag, for `--event release`
    #[arg(long, global = true, env = "EEBUILD_RELEASE_TAG")]
    release_tag: Option<String>,

    /// Pull request number, for `--event pull-request`
    #[arg(long, global = true, env = "EEBUILD_PR_NUMBER")]
    pr_number: Option<u64>,

    /// Default branch name, for `--event auto`
    #[arg(long, global = true, env = "EEBUILD_DEFAULT_BRANCH", default_value = "main")]
    default_branch: String,

    /// Registry username (defaults to GITHUB_ACTOR)
    #[arg(long, global = true, env = "EEBUILD_REGISTRY_USER")]
    registry_user: Option<String>,

    /// Builder executable
    #[arg(
        long = "builder-bin",
        global = true,
        env = "EEBUILD_BUILDER",
        default_value = DEFAULT_BUILDER,
    )]
    builder_bin: String,

    /// Scanner executable
    #[arg(
        long = "scanner-bin",
        global = true,
        env = "EEBUILD_SCANNER",
        default_value = DEFAULT_SCANNER,
    )]
    scanner_bin: String,

    /// Scanner image used when the scanner executable is unavailable
    #[arg(
        long,
        global = true,
        env = "EEBUILD_SCANNER_IMAGE",
        default_value = DEFAULT_SCANNER_IMAGE,
    )]
    scanner_image: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum EventArg {
    Release,
    Push,
    PullRequest,
    Manual,
    Auto,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    eebuild_core::init_tracing(cli.json, level);

    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
    let command = cli.command.unwrap_or(Commands::All);

    let event = resolve_event(&cli.run, env)?;
    let publishes = command == Commands::Tags || command == Commands::Ci;
    let target = registry_target(&cli.run, env, publishes)?;

    if command == Commands::Tags {
        return cmd_tags(&event, &target, cli.json);
    }

    let ctx = build_context(&cli.run, cli.verbose, event, target, read_credential(&cli.run, env));
    let plan = plan_for(command);
    cmd_run(&ctx, &plan, cli.run.run_report.as_ref()).await
}

/// Resolve the trigger event from flags, or from the CI environment for `auto`.
fn resolve_event<F>(args: &RunArgs, env: F) -> Result<EventContext>
where
    F: Fn(&str) -> Option<String>,
{
    let event = match args.event {
        EventArg::Release => {
            let tag = args
                .release_tag
                .clone()
                .context("--event release requires --release-tag")?;
            EventContext::release(tag)?
        }
        EventArg::Push => EventContext::DefaultBranchPush,
        EventArg::PullRequest => EventContext::PullRequest {
            number: args
                .pr_number
                .context("--event pull-request requires --pr-number")?,
        },
        EventArg::Manual => EventContext::Manual,
        EventArg::Auto => EventContext::from_ci_env(env, &args.default_branch)?,
    };
    Ok(event)
}

fn registry_target<F>(args: &RunArgs, env: F, required: bool) -> Result<RegistryTarget>
where
    F: Fn(&str) -> Option<String>,
{
    let image = match args.image.clone().or_else(|| env("GITHUB_REPOSITORY")) {
        Some(image) => image,
        None if required => {
            anyhow::bail!("registry image is not set (use --image or EEBUILD_IMAGE)")
        }
        None => LOCAL_IMAGE_NAME.to_string(),
    };
    Ok(RegistryTarget::new(&args.registry, image))
}

/// Token from `EEBUILD_REGISTRY_TOKEN`, falling back to `GITHUB_TOKEN`.
fn read_credential<F>(args: &RunArgs, env: F) -> Option<RegistryCredential>
where
    F: Fn(&str) -> Option<String>,
{
    let token = env("EEBUILD_REGISTRY_TOKEN").or_else(|| env("GITHUB_TOKEN"))?;
    let username = args
        .registry_user
        .clone()
        .or_else(|| env("GITHUB_ACTOR"))?;
    Some(RegistryCredential::new(username, SecretToken::new(token)))
}

fn build_context(
    args: &RunArgs,
    verbose: bool,
    event: EventContext,
    target: RegistryTarget,
    credential: Option<RegistryCredential>,
) -> RunContext {
    let suite = FunctionalSuite::default()
        .with_playbook(&args.playbook)
        .expect_collections(args.expect_collections.iter().cloned())
        .with_imports(args.imports.iter().cloned());

    let ctx = RunContext::new(target)
        .with_manifest(&args.file)
        .with_runtime(args.runtime)
        .with_image_tag(&args.tag)
        .with_event(event)
        .with_suite(suite)
        .with_report_path(&args.report)
        .with_builder_program(&args.builder_bin)
        .with_scanner_program(&args.scanner_bin)
        .with_scanner_image(&args.scanner_image)
        .verbose(verbose);

    match credential {
        Some(credential) => ctx.with_credential(credential),
        None => ctx,
    }
}

fn plan_for(command: Commands) -> StagePlan {
    match command {
        Commands::Validate => StagePlan::only(&[Stage::Validate]),
        Commands::Build => StagePlan::only(&[Stage::Build]),
        Commands::Test => StagePlan::only(&[Stage::Test]),
        Commands::Scan => StagePlan::only(&[Stage::Scan]),
        Commands::Tags => StagePlan::only(&[Stage::Tag]),
        Commands::All => StagePlan::local(),
        Commands::Ci => StagePlan::full(),
    }
}

fn cmd_tags(event: &EventContext, target: &RegistryTarget, json: bool) -> Result<()> {
    let policy = compute_tag_policy(event, target);
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&policy).context("serialize tag policy")?
        );
    } else {
        for reference in &policy.tags {
            println!("{reference}");
        }
    }
    info!(event = %event.label(), publish = policy.publish, "Tag policy computed");
    Ok(())
}

async fn cmd_run(ctx: &RunContext, plan: &StagePlan, run_report: Option<&PathBuf>) -> Result<()> {
    println!("Manifest: {}", ctx.manifest_path.display());
    println!("Image: {} ({})", ctx.image_tag, ctx.runtime);
    println!("Event: {}", ctx.event.label());
    println!();

    let result = Pipeline::run(&ProcessRunner, ctx, plan).await;
    print_result(&result);

    if let Some(path) = run_report {
        let artifact = RunReportArtifact::from_result(&result, &ctx.event.label());
        write_run_report(path, &artifact)?;
        println!("Run report: {}", path.display());
    }

    let stage = result.failed_stage();
    if let Err(err) = result.into_result() {
        let stage = stage.map(|s| s.name()).unwrap_or("pipeline");
        return Err(anyhow::Error::new(err).context(format!("{stage} stage failed")));
    }
    Ok(())
}

fn status_symbol(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Passed => "✓",
        StageStatus::Failed => "✗",
        StageStatus::Skipped => "-",
        StageStatus::Degraded => "!",
    }
}

fn print_result(result: &PipelineResult) {
    println!("Run ID: {}", result.run_id);
    if let Some(digest) = &result.manifest_digest {
        println!("Manifest digest: {digest}");
    }
    println!(
        "Status: {}",
        if result.success() {
            "✓ PASSED"
        } else {
            "✗ FAILED"
        }
    );
    println!("Duration: {}ms", result.duration_ms);
    println!();

    for record in &result.stages {
        println!(
            "  {} {} ({}ms) {}",
            status_symbol(record.status),
            record.stage,
            record.duration_ms,
            record.detail
        );
    }

    if let Some(tests) = &result.tests {
        println!();
        for check in &tests.results {
            let mark = if check.passed { "✓" } else { "✗" };
            let severity = if check.check.is_hard() { "hard" } else { "soft" };
            println!("    {} {} [{}] {}", mark, check.check, severity, check.detail);
        }
    }

    if !result.pushed.is_empty() {
        println!();
        for reference in &result.pushed {
            println!("  pushed {reference}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("eebuild").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert!(cli.command.is_none());
        assert_eq!(cli.run.file, PathBuf::from("execution-environment.yml"));
        assert_eq!(cli.run.runtime, ContainerRuntime::Podman);
        assert_eq!(cli.run.tag, "localhost/ee-build:latest");
        assert_eq!(cli.run.report, PathBuf::from("trivy-results.sarif"));
    }

    #[test]
    fn test_flags_after_subcommand() {
        let cli = parse(&[
            "test",
            "--runtime",
            "docker",
            "--expect-collection",
            "community.general",
            "--expect-collection",
            "vmware.vmware_rest",
            "--import",
            "pyVmomi",
        ]);
        assert_eq!(cli.command, Some(Commands::Test));
        assert_eq!(cli.run.runtime, ContainerRuntime::Docker);
        assert_eq!(cli.run.expect_collections.len(), 2);

        let ctx = build_context(
            &cli.run,
            false,
            EventContext::Manual,
            RegistryTarget::new("ghcr.io", "acme/ee"),
            None,
        );
        assert_eq!(ctx.suite.imports, vec!["ansible", "ansible_runner", "pyVmomi"]);
        assert_eq!(ctx.runtime, ContainerRuntime::Docker);
    }

    #[test]
    fn test_runtime_aliases() {
        assert_eq!(parse(&["--runtime", "runtime-b"]).run.runtime, ContainerRuntime::Docker);
        assert!(Cli::try_parse_from(["eebuild", "--runtime", "lxc"]).is_err());
    }

    #[test]
    fn test_explicit_events() {
        let cli = parse(&["--event", "release", "--release-tag", "v3.1.0"]);
        assert_eq!(
            resolve_event(&cli.run, env(&[])).unwrap(),
            EventContext::Release {
                tag: "v3.1.0".into()
            }
        );

        let cli = parse(&["--event", "pull-request", "--pr-number", "12"]);
        assert_eq!(
            resolve_event(&cli.run, env(&[])).unwrap(),
            EventContext::PullRequest { number: 12 }
        );

        let cli = parse(&["--event", "release"]);
        assert!(resolve_event(&cli.run, env(&[])).is_err());
    }

    #[test]
    fn test_auto_event_reads_ci_environment() {
        let cli = parse(&[]);
        let event = resolve_event(
            &cli.run,
            env(&[("GITHUB_EVENT_NAME", "push"), ("GITHUB_REF", "refs/heads/main")]),
        )
        .unwrap();
        assert_eq!(event, EventContext::DefaultBranchPush);
    }

    #[test]
    fn test_registry_image_required_for_publishing_commands() {
        let cli = parse(&["ci"]);
        assert!(registry_target(&cli.run, env(&[]), true).is_err());

        let target =
            registry_target(&cli.run, env(&[("GITHUB_REPOSITORY", "Acme/EE-Cloud")]), true)
                .unwrap();
        assert_eq!(target.reference("main"), "ghcr.io/acme/ee-cloud:main");

        let local = registry_target(&cli.run, env(&[]), false).unwrap();
        assert_eq!(local.image, LOCAL_IMAGE_NAME);
    }

    #[test]
    fn test_credential_token_fallback() {
        let cli = parse(&["--registry-user", "bot"]);
        let cred = read_credential(&cli.run, env(&[("GITHUB_TOKEN", "ghp_x")])).unwrap();
        assert_eq!(cred.username, "bot");
        assert_eq!(cred.token.expose(), "ghp_x");

        let cred = read_credential(
            &cli.run,
            env(&[("GITHUB_TOKEN", "ghp_x"), ("EEBUILD_REGISTRY_TOKEN", "pat_y")]),
        )
        .unwrap();
        assert_eq!(cred.token.expose(), "pat_y");

        assert!(read_credential(&parse(&[]).run, env(&[("GITHUB_TOKEN", "t")])).is_none());
    }

    #[test]
    fn test_plans() {
        assert!(plan_for(Commands::Ci).is_enabled(Stage::Publish));
        assert!(!plan_for(Commands::All).is_enabled(Stage::Publish));
        assert_eq!(plan_for(Commands::Scan).enabled().collect::<Vec<_>>(), vec![Stage::Scan]);
    }
}

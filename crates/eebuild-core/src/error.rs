//! Error taxonomy for the build pipeline.

use std::path::PathBuf;

/// Errors produced while reading or parsing a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("cannot read manifest {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write manifest {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest {path:?} is not valid UTF-8: {source}")]
    Encoding {
        path: PathBuf,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("malformed manifest: {0}")]
    Syntax(#[from] serde_yaml::Error),

    #[error("manifest failed structural checks: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Fatal pipeline errors. The first one raised is the final status of a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed manifest or missing configuration; raised before any build.
    #[error("config error: {0}")]
    Config(String),

    /// An external tool misbehaved or could not be started.
    #[error("tool error: {tool}: {reason}")]
    Tool { tool: String, reason: String },

    /// The image build failed. Carries the builder's own output verbatim.
    #[error("build error: {0}")]
    Build(String),

    /// One or more hard functional checks failed.
    #[error("functional checks failed: {}", failed_checks.join(", "))]
    TestFailure { failed_checks: Vec<String> },

    /// A push failed; tags after `tag` were not attempted.
    #[error("publish error for {tag}: {reason}")]
    Publish { tag: String, reason: String },
}

impl PipelineError {
    /// Short label used when reporting which kind of failure halted the run.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::Tool { .. } => "tool",
            PipelineError::Build(_) => "build",
            PipelineError::TestFailure { .. } => "test",
            PipelineError::Publish { .. } => "publish",
        }
    }
}

impl From<ManifestError> for PipelineError {
    fn from(err: ManifestError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

/// Scanner failures. Never converted into a [`PipelineError`]: a scan problem
/// is logged and the run carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("scanner {program} could not be started: {reason}")]
    Unavailable { program: String, reason: String },

    #[error("scanner {program} exited with {exit_code} and wrote no report")]
    NoReport { program: String, exit_code: i32 },

    #[error("scan report {path:?} is not valid SARIF: {reason}")]
    InvalidReport { path: PathBuf, reason: String },
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

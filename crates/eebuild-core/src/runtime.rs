//! Container engine selection.

use serde::{Deserialize, Serialize};

/// Which container engine executes build and run operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerRuntime {
    /// Primary backend.
    #[default]
    Podman,
    /// Alternate backend.
    Docker,
}

impl ContainerRuntime {
    /// Executable name, also the value passed to the builder's
    /// `--container-runtime` flag.
    pub fn program(&self) -> &'static str {
        match self {
            ContainerRuntime::Podman => "podman",
            ContainerRuntime::Docker => "docker",
        }
    }

    /// Host path of the engine's API socket, for tools that talk to the
    /// engine from inside a container.
    pub fn socket_path(&self) -> &'static str {
        match self {
            ContainerRuntime::Podman => "/run/podman/podman.sock",
            ContainerRuntime::Docker => "/var/run/docker.sock",
        }
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.program())
    }
}

impl std::str::FromStr for ContainerRuntime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "podman" | "runtime-a" => Ok(ContainerRuntime::Podman),
            "docker" | "runtime-b" => Ok(ContainerRuntime::Docker),
            other => Err(format!(
                "unknown container runtime '{other}' (expected podman or docker)"
            )),
        }
    }
}

//! Registry destination and credentials.

use serde::{Deserialize, Serialize};

/// Default registry host.
pub const DEFAULT_REGISTRY: &str = "ghcr.io";

/// Where published images go: `<registry>/<image>:<tag>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryTarget {
    /// Registry host, e.g. `ghcr.io`.
    pub registry: String,
    /// Repository path inside the registry, e.g. `acme/ee-cloud`.
    pub image: String,
}

impl RegistryTarget {
    pub fn new(registry: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            registry: registry.into().trim_end_matches('/').to_string(),
            image: image.into().trim_matches('/').to_lowercase(),
        }
    }

    /// Full reference for `tag`.
    pub fn reference(&self, tag: &str) -> String {
        format!("{}/{}:{}", self.registry, self.image, tag)
    }
}

/// A secret string that never appears in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value. Only hand this to a child process's stdin.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretToken(<redacted>)")
    }
}

impl std::fmt::Display for SecretToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Registry login.
#[derive(Debug, Clone)]
pub struct RegistryCredential {
    pub username: String,
    pub token: SecretToken,
}

impl RegistryCredential {
    pub fn new(username: impl Into<String>, token: SecretToken) -> Self {
        Self {
            username: username.into(),
            token,
        }
    }
}

//! Execution-environment manifest (`execution-environment.yml`).
//!
//! The manifest is loaded once per run and never mutated afterwards. The
//! model covers every key of the version 3 format and every struct rejects
//! keys outside it, so a misspelt key fails loudly instead of being dropped on
//! re-serialization.

mod galaxy;
mod system;

pub use galaxy::{CollectionRequirement, GalaxyRequirements, RoleRequirement, COLLECTION_KINDS};
pub use system::{PythonRequirements, SystemPackage, SystemRequirements};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::digest::ManifestDigest;
use crate::error::ManifestError;

/// Manifest schema version this reader understands.
pub const SUPPORTED_VERSION: u32 = 3;

/// Default manifest file name.
pub const DEFAULT_MANIFEST_FILE: &str = "execution-environment.yml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub version: u32,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub build_arg_defaults: BTreeMap<String, String>,

    pub images: Images,

    pub dependencies: Dependencies,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BuildOptions>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_build_files: Vec<BuildFile>,

    #[serde(default, skip_serializing_if = "BuildSteps::is_empty")]
    pub additional_build_steps: BuildSteps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Images {
    pub base_image: BaseImage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseImage {
    /// Fully qualified image reference, e.g. `quay.io/centos/centos:stream9`.
    pub name: String,

    /// Name the image signature was issued for, when pulled from a mirror.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_original_name: Option<String>,
}

/// The three dependency tiers plus the interpreter and core runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dependencies {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_interpreter: Option<PythonInterpreter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ansible_core: Option<PipPackage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ansible_runner: Option<PipPackage>,

    #[serde(default, skip_serializing_if = "GalaxyRequirements::is_empty")]
    pub galaxy: GalaxyRequirements,

    #[serde(default, skip_serializing_if = "SystemRequirements::is_empty")]
    pub system: SystemRequirements,

    #[serde(default, skip_serializing_if = "PythonRequirements::is_empty")]
    pub python: PythonRequirements,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Exclusions>,
}

/// Requirements pulled in by collections that the image must not install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Exclusions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub python: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_from_collections: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PythonInterpreter {
    /// System package providing the interpreter, e.g. `python3.11`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_system: Option<String>,

    /// Absolute path of the interpreter inside the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipPackage {
    /// pip requirement specifier, e.g. `ansible-core>=2.15`.
    pub package_pip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_manager_path: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// User the final image runs as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_init: Option<ContainerInit>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_ansible_check: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_pip_install: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relax_passwd_permissions: Option<bool>,
}

/// Init process and default command of the final image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerInit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_pip: Option<String>,

    /// JSON-encoded entrypoint, e.g. `'["dumb-init"]'`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
}

/// A file copied into the build context before the build runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildFile {
    /// Source path or glob, relative to the manifest.
    pub src: String,

    /// Destination directory under the build context's `_build/`.
    pub dest: String,
}

/// Post-build steps, injected verbatim into the generated build file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSteps {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prepend_base: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub append_base: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prepend_final: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub append_final: Vec<String>,
}

impl BuildSteps {
    pub fn is_empty(&self) -> bool {
        self.prepend_base.is_empty()
            && self.append_base.is_empty()
            && self.prepend_final.is_empty()
            && self.append_final.is_empty()
    }

    /// All steps with their section name, in build order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.prepend_base
            .iter()
            .map(|s| ("prepend_base", s.as_str()))
            .chain(self.append_base.iter().map(|s| ("append_base", s.as_str())))
            .chain(self.prepend_final.iter().map(|s| ("prepend_final", s.as_str())))
            .chain(self.append_final.iter().map(|s| ("append_final", s.as_str())))
    }
}

impl Manifest {
    /// Parse a manifest from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Serialize back to YAML. Embedded sub-documents are emitted as strings.
    pub fn to_yaml_string(&self) -> Result<String, ManifestError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write the manifest to `path`.
    pub fn write(&self, path: &Path) -> Result<(), ManifestError> {
        let text = self.to_yaml_string()?;
        std::fs::write(path, text).map_err(|source| ManifestError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Names of every collection the manifest installs.
    pub fn collection_names(&self) -> Vec<String> {
        self.dependencies.galaxy.names().map(str::to_string).collect()
    }
}

/// A manifest together with where it came from and its content digest.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub path: PathBuf,
    pub manifest: Manifest,
    pub digest: ManifestDigest,
}

impl LoadedManifest {
    /// Read and parse the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let bytes = std::fs::read(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let digest = ManifestDigest::from_bytes(&bytes);
        let text = String::from_utf8(bytes).map_err(|source| ManifestError::Encoding {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Manifest::from_yaml_str(&text)?;
        Ok(Self {
            path: path.to_path_buf(),
            manifest,
            digest,
        })
    }
}

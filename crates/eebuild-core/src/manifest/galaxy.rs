//! The `dependencies.galaxy` sub-document: collections and roles to install.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One collection requirement.
///
/// A bare string entry (`- community.general`) reads as a requirement with
/// only a name. Entries are always written back in mapping form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CollectionRepr")]
pub struct CollectionRequirement {
    /// Fully qualified `namespace.name`.
    pub name: String,

    /// Version constraint, e.g. `>=1.2.0`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Source override (a Galaxy server URL or a git/file location).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Requirement type (`galaxy`, `git`, `url`, `file`, `dir`, `subdirs`).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl CollectionRequirement {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            source: None,
            kind: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CollectionFields {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CollectionRepr {
    Name(String),
    Fields(CollectionFields),
}

impl From<CollectionRepr> for CollectionRequirement {
    fn from(repr: CollectionRepr) -> Self {
        match repr {
            CollectionRepr::Name(name) => Self::named(name),
            CollectionRepr::Fields(f) => Self {
                name: f.name,
                version: f.version,
                source: f.source,
                kind: f.kind,
            },
        }
    }
}

/// One role requirement. Either `name` or `src` identifies the role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RoleRepr")]
pub struct RoleRequirement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// `git` or `hg` when `src` is a repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scm: Option<String>,
}

impl RoleRequirement {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RoleFields {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    src: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    scm: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RoleRepr {
    Name(String),
    Fields(RoleFields),
}

impl From<RoleRepr> for RoleRequirement {
    fn from(repr: RoleRepr) -> Self {
        match repr {
            RoleRepr::Name(name) => Self::named(name),
            RoleRepr::Fields(f) => Self {
                name: f.name,
                src: f.src,
                version: f.version,
                scm: f.scm,
            },
        }
    }
}

/// Requirement types the builder's collection installer understands.
pub const COLLECTION_KINDS: &[&str] = &["galaxy", "git", "url", "file", "dir", "subdirs"];

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct GalaxyDocument {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    collections: Vec<CollectionRequirement>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    roles: Vec<RoleRequirement>,
}

/// Parsed `galaxy` requirements.
///
/// The manifest normally embeds this as a YAML string; an inline mapping is
/// accepted too. Serialization always produces the embedded string form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GalaxyRequirements {
    pub collections: Vec<CollectionRequirement>,
    pub roles: Vec<RoleRequirement>,
}

impl GalaxyRequirements {
    pub fn new(collections: Vec<CollectionRequirement>) -> Self {
        Self {
            collections,
            roles: Vec::new(),
        }
    }

    pub fn with_roles(mut self, roles: Vec<RoleRequirement>) -> Self {
        self.roles = roles;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty() && self.roles.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(|c| c.name.as_str())
    }

    fn from_embedded(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let doc: GalaxyDocument = serde_yaml::from_str(text)?;
        Ok(doc.into())
    }

    fn to_embedded(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&GalaxyDocument {
            collections: self.collections.clone(),
            roles: self.roles.clone(),
        })
    }
}

impl From<GalaxyDocument> for GalaxyRequirements {
    fn from(doc: GalaxyDocument) -> Self {
        Self {
            collections: doc.collections,
            roles: doc.roles,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GalaxyRepr {
    Embedded(String),
    Inline(GalaxyDocument),
}

impl<'de> Deserialize<'de> for GalaxyRequirements {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match GalaxyRepr::deserialize(deserializer)? {
            GalaxyRepr::Embedded(text) => GalaxyRequirements::from_embedded(&text)
                .map_err(|e| D::Error::custom(format!("dependencies.galaxy: {e}"))),
            GalaxyRepr::Inline(doc) => Ok(doc.into()),
        }
    }
}

impl Serialize for GalaxyRequirements {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let text = self
            .to_embedded()
            .map_err(|e| serde::ser::Error::custom(e.to_string()))?;
        serializer.serialize_str(&text)
    }
}

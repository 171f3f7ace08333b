//! Line-oriented package lists: `dependencies.system` (bindep) and
//! `dependencies.python` (pip requirements).

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One bindep entry: `name [constraint] [selector selector ...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPackage {
    pub name: String,

    /// Version constraint text between the name and the selector list,
    /// e.g. `>=2.9`.
    pub constraint: Option<String>,

    /// Bracketed selectors in source order, e.g. `platform:rpm`, `compile`.
    pub selectors: Vec<String>,
}

impl SystemPackage {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (head, selectors) = match line.split_once('[') {
            Some((head, rest)) => {
                let inner = rest
                    .trim_end()
                    .strip_suffix(']')
                    .ok_or_else(|| format!("unterminated selector list in '{line}'"))?;
                if inner.contains('[') || inner.contains(']') {
                    return Err(format!("nested brackets in '{line}'"));
                }
                (head, inner.split_whitespace().map(str::to_string).collect())
            }
            None => (line, Vec::new()),
        };

        let mut parts = head.trim().splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default().to_string();
        if name.is_empty() {
            return Err(format!("missing package name in '{line}'"));
        }
        let constraint = parts
            .next()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(Self {
            name,
            constraint,
            selectors,
        })
    }

    /// Whether the entry carries the given selector (e.g. `platform:rpm`).
    pub fn has_selector(&self, selector: &str) -> bool {
        self.selectors.iter().any(|s| s == selector)
    }
}

impl std::fmt::Display for SystemPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(constraint) = &self.constraint {
            write!(f, " {constraint}")?;
        }
        if !self.selectors.is_empty() {
            write!(f, " [{}]", self.selectors.join(" "))?;
        }
        Ok(())
    }
}

/// Either an embedded multi-line string (the builder's native form) or a
/// YAML list of lines.
#[derive(Deserialize)]
#[serde(untagged)]
enum LinesRepr {
    Embedded(String),
    List(Vec<String>),
}

impl LinesRepr {
    /// Non-blank, non-comment lines, trimmed.
    fn into_lines(self) -> Vec<String> {
        let raw: Vec<String> = match self {
            LinesRepr::Embedded(text) => text.lines().map(str::to_string).collect(),
            LinesRepr::List(lines) => lines,
        };
        raw.into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect()
    }
}

fn join_lines<I: IntoIterator<Item = String>>(lines: I) -> String {
    lines.into_iter().map(|l| l + "\n").collect()
}

/// Parsed `system` requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemRequirements {
    pub packages: Vec<SystemPackage>,
}

impl SystemRequirements {
    pub fn new(packages: Vec<SystemPackage>) -> Self {
        Self { packages }
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl<'de> Deserialize<'de> for SystemRequirements {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let packages = LinesRepr::deserialize(deserializer)?
            .into_lines()
            .iter()
            .map(|line| SystemPackage::parse(line))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| D::Error::custom(format!("dependencies.system: {e}")))?;
        Ok(Self { packages })
    }
}

impl Serialize for SystemRequirements {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&join_lines(self.packages.iter().map(|p| p.to_string())))
    }
}

/// Parsed `python` requirements, one pip requirement specifier per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PythonRequirements {
    pub requirements: Vec<String>,
}

impl PythonRequirements {
    pub fn new<I, S>(requirements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            requirements: requirements.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl<'de> Deserialize<'de> for PythonRequirements {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self {
            requirements: LinesRepr::deserialize(deserializer)?.into_lines(),
        })
    }
}

impl Serialize for PythonRequirements {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&join_lines(self.requirements.iter().cloned()))
    }
}

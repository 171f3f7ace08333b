//! Tag/publish policy.
//!
//! Maps the run's [`EventContext`] to the ordered set of image references to
//! produce and whether they are pushed. The mapping is total: every variant
//! is handled explicitly and there is no fallthrough branch.

use serde::{Deserialize, Serialize};

use crate::event::EventContext;
use crate::registry::RegistryTarget;

/// Tag applied alongside the release tag on releases.
pub const LATEST_TAG: &str = "latest";
/// Tag for default-branch pushes.
pub const DEFAULT_BRANCH_TAG: &str = "main";
/// Tag for manual and unrecognised triggers.
pub const MANUAL_TAG: &str = "manual";

/// Ordered, non-empty list of full image references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet(Vec<String>);

impl TagSet {
    fn of(target: &RegistryTarget, first: &str, rest: &[&str]) -> Self {
        let mut refs = vec![target.reference(first)];
        refs.extend(rest.iter().map(|t| target.reference(t)));
        Self(refs)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Tag set from explicit references; `None` when `refs` is empty.
    pub fn from_references<I, S>(refs: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let refs: Vec<String> = refs.into_iter().map(Into::into).collect();
        (!refs.is_empty()).then_some(Self(refs))
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Outcome of the policy: what to tag and whether to push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPolicy {
    pub tags: TagSet,
    pub publish: bool,
}

/// Compute the tag set and publish decision for a run.
pub fn compute_tag_policy(event: &EventContext, target: &RegistryTarget) -> TagPolicy {
    match event {
        EventContext::Release { tag } => TagPolicy {
            tags: TagSet::of(target, tag, &[LATEST_TAG]),
            publish: true,
        },
        EventContext::DefaultBranchPush => TagPolicy {
            tags: TagSet::of(target, DEFAULT_BRANCH_TAG, &[]),
            publish: true,
        },
        EventContext::PullRequest { number } => TagPolicy {
            tags: TagSet::of(target, &format!("pr-{number}"), &[]),
            publish: false,
        },
        EventContext::Manual => TagPolicy {
            tags: TagSet::of(target, MANUAL_TAG, &[]),
            publish: false,
        },
    }
}

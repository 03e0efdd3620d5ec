//! Registry tag derivation
//!
//! Maps a matrix entry and a source-control reference to the tags published
//! for it on every target registry.

use crate::constants::{registry, tag};
use crate::error::{Error, Result};
use crate::matrix::{Channel, Matrix, MatrixEntry};
use crate::reference::is_valid_tag;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

mod source;


pub use source::SourceRef;

/// Target registries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Registry {
    Ghcr,
    Dockerhub,
}

impl Registry {
    pub const ALL: [Registry; 2] = [Registry::Ghcr, Registry::Dockerhub];

    pub fn host(&self) -> &'static str {
        match self {
            Registry::Ghcr => registry::GHCR,
            Registry::Dockerhub => registry::DOCKERHUB,
        }
    }
}

/// Owner/namespace of the repository on each registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryMapping {
    pub ghcr_owner: String,
    pub dockerhub_namespace: String,
}

impl RegistryMapping {
    /// Full repository name of `repository` on `registry`
    pub fn repository(&self, registry: Registry, repository: &str) -> String {
        let owner = match registry {
            Registry::Ghcr => &self.ghcr_owner,
            Registry::Dockerhub => &self.dockerhub_namespace,
        };
        format!("{}/{}/{}", registry.host(), owner.to_lowercase(), repository)
    }
}

/// Tags to publish for one matrix entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    pub repository: String,
    pub tags: BTreeSet<String>,
    pub registries: BTreeSet<Registry>,
}

impl TagSet {
    /// `<registry>/<owner>/<repository>:<tag>` for every registry and tag
    pub fn references(&self, mapping: &RegistryMapping) -> Vec<String> {
        self.registries
            .iter()
            .flat_map(|r| {
                let repo = mapping.repository(*r, &self.repository);
                self.tags.iter().map(move |t| format!("{}:{}", repo, t))
            })
            .collect()
    }
}

/// Everything tag derivation needs besides the entry and the ref
#[derive(Debug, Clone)]
pub struct TagPolicy {
    pub repository: String,
    pub default_branch: String,
    pub default_variants: BTreeMap<Channel, String>,
}

/// Derives [`TagSet`]s. Holds no mutable state; safe to share across tasks.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    policy: TagPolicy,
}

impl TagGenerator {
    pub fn new(policy: TagPolicy) -> Self {
        Self { policy }
    }

    pub fn for_matrix(matrix: &Matrix) -> Self {
        Self::new(TagPolicy {
            repository: matrix.repository().to_string(),
            default_branch: matrix.default_branch().to_string(),
            default_variants: matrix.default_variants().clone(),
        })
    }

    pub fn policy(&self) -> &TagPolicy {
        &self.policy
    }

    /// Whether the entry publishes unqualified tags on its channel
    pub fn is_default_variant(&self, entry: &MatrixEntry) -> bool {
        self.policy
            .default_variants
            .get(&entry.channel())
            .is_some_and(|v| v == entry.variant())
    }

    /// Derive the tag set for `entry` built from `source`.
    pub fn derive(&self, entry: &MatrixEntry, source: &SourceRef) -> Result<TagSet> {
        let suffix = if self.is_default_variant(entry) {
            String::new()
        } else {
            sanitize(&format!("-{}-{}", entry.variant(), entry.architecture().tag_safe()))
        };

        let raw = self.raw_tags(entry, source, &suffix)?;

        // Final tag → raw tag it came from, to report collisions
        let mut produced: BTreeMap<String, String> = BTreeMap::new();
        for raw_tag in raw {
            let Some(final_tag) = qualify(&raw_tag, &suffix) else {
                debug!("Dropping tag '{}': nothing left after sanitizing", raw_tag);
                continue;
            };
            debug_assert!(is_valid_tag(&final_tag));
            if let Some(previous) = produced.get(&final_tag) {
                if *previous != raw_tag {
                    return Err(Error::TagCollision {
                        first: previous.clone(),
                        second: raw_tag,
                        tag: final_tag,
                    });
                }
                continue;
            }
            produced.insert(final_tag, raw_tag);
        }

        if produced.is_empty() {
            return Err(Error::EmptyTagSet {
                source_ref: source.to_string(),
            });
        }

        let tags: BTreeSet<String> = produced.into_keys().collect();
        debug!("Derived tags for {}: {:?}", entry.id(), tags);

        Ok(TagSet {
            repository: self.policy.repository.clone(),
            tags,
            registries: Registry::ALL.into_iter().collect(),
        })
    }

    /// Unsanitized tags in derivation order
    fn raw_tags(&self, entry: &MatrixEntry, source: &SourceRef, suffix: &str) -> Result<Vec<String>> {
        let channel = entry.channel();
        let mut raw = Vec::new();

        match source {
            SourceRef::Tag {
                semver: Some(version),
                ..
            } => {
                raw.push(version.to_string());
                if version.pre.is_empty() && channel != Channel::Archived {
                    raw.push(format!("{}.{}", version.major, version.minor));
                    raw.push(version.major.to_string());
                    if channel == Channel::Stable {
                        raw.push(tag::LATEST.to_string());
                    }
                }
            }
            SourceRef::Branch { name, .. } if *name == self.policy.default_branch => {
                if let Some(moving) = moving_tag(channel) {
                    raw.push(moving.to_string());
                }
            }
            // Tags that are not semver behave like branches. Archived entries
            // publish these names too; only moving tags are withheld there.
            SourceRef::Tag { name, semver: None, .. } | SourceRef::Branch { name, .. } => {
                if let Some(reserved) = reserved_tag(name) {
                    return Err(Error::TagCollision {
                        first: name.clone(),
                        tag: qualify(&reserved, suffix).unwrap_or_else(|| reserved.clone()),
                        second: reserved,
                    });
                }
                raw.push(name.clone());
            }
            SourceRef::Commit { .. } => {}
        }

        if let Some(short) = source.short_sha() {
            raw.push(format!("{}{}", tag::SHA_PREFIX, short));
        }

        Ok(raw)
    }
}

/// The tag a branch-like name would publish when that tag is one the
/// generator derives itself: a moving tag, a version or a commit tag.
fn reserved_tag(name: &str) -> Option<String> {
    let sanitized = sanitize(name);
    let head = sanitized.trim_start_matches(['.', '-']);
    let versioned = head.starts_with(|c: char| c.is_ascii_digit())
        && (head.chars().all(|c| c.is_ascii_digit() || c == '.')
            || semver::Version::parse(head).is_ok());
    let commit = head
        .strip_prefix(tag::SHA_PREFIX)
        .is_some_and(|h| h.len() == 7 && h.chars().all(|c| c.is_ascii_hexdigit()));
    (head == tag::LATEST || head == tag::EDGE || versioned || commit).then(|| head.to_string())
}

fn moving_tag(channel: Channel) -> Option<&'static str> {
    match channel {
        Channel::Stable => Some(tag::LATEST),
        Channel::Edge => Some(tag::EDGE),
        Channel::Archived => None,
    }
}

/// Lowercase and replace anything outside `[a-z0-9_.-]` with `-`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Sanitize `raw`, strip characters a tag may not start with, and truncate it
/// so that `raw + suffix` fits the registry length limit.
fn qualify(raw: &str, suffix: &str) -> Option<String> {
    let sanitized = sanitize(raw);
    let trimmed = sanitized.trim_start_matches(['.', '-']);
    if trimmed.is_empty() {
        return None;
    }
    let budget = tag::MAX_LEN.saturating_sub(suffix.len());
    if budget == 0 {
        return None;
    }
    // Sanitized tags are ASCII, so byte truncation is char-safe
    let head = &trimmed[..trimmed.len().min(budget)];
    Some(format!("{}{}", head, suffix))
}

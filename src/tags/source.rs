use crate::constants::tag;
use std::fmt;

/// The source-control reference an image was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Branch {
        name: String,
        sha: Option<String>,
    },
    Tag {
        name: String,
        semver: Option<semver::Version>,
        sha: Option<String>,
    },
    Commit {
        sha: String,
    },
}

impl SourceRef {
    pub fn branch(name: impl Into<String>, sha: Option<String>) -> Self {
        SourceRef::Branch {
            name: name.into(),
            sha,
        }
    }

    /// A git tag; `semver` is parsed from the name, ignoring a leading `v`.
    pub fn tag(name: impl Into<String>, sha: Option<String>) -> Self {
        let name = name.into();
        let semver = parse_semver(&name);
        SourceRef::Tag { name, semver, sha }
    }

    pub fn commit(sha: impl Into<String>) -> Self {
        SourceRef::Commit { sha: sha.into() }
    }

    /// Build from a full git ref such as `refs/heads/main` or `refs/tags/v1.2.3`.
    /// Bare names are taken as branches. Returns `None` when neither a ref nor a
    /// sha is available.
    pub fn from_git_ref(git_ref: Option<&str>, sha: Option<&str>) -> Option<Self> {
        let sha = sha.map(str::to_string).filter(|s| !s.is_empty());
        match git_ref.filter(|r| !r.is_empty()) {
            Some(r) => Some(match r.strip_prefix("refs/tags/") {
                Some(name) => Self::tag(name, sha),
                None => Self::branch(r.strip_prefix("refs/heads/").unwrap_or(r), sha),
            }),
            None => sha.map(Self::commit),
        }
    }

    /// Resolve explicitly supplied values. A tag takes precedence over a
    /// branch when both describe the same build.
    pub fn resolve(tag: Option<&str>, branch: Option<&str>, sha: Option<&str>) -> Option<Self> {
        let sha = sha.map(str::to_string).filter(|s| !s.is_empty());
        if let Some(tag) = tag.filter(|t| !t.is_empty()) {
            return Some(Self::tag(tag, sha));
        }
        if let Some(branch) = branch.filter(|b| !b.is_empty()) {
            return Some(Self::branch(branch, sha));
        }
        sha.map(Self::commit)
    }

    pub fn sha(&self) -> Option<&str> {
        match self {
            SourceRef::Branch { sha, .. } | SourceRef::Tag { sha, .. } => sha.as_deref(),
            SourceRef::Commit { sha } => Some(sha.as_str()),
        }
    }

    /// First seven characters of the commit sha, if the sha looks like one
    pub fn short_sha(&self) -> Option<String> {
        let sha = self.sha()?;
        if sha.len() < tag::SHORT_SHA_LEN || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(sha[..tag::SHORT_SHA_LEN].to_ascii_lowercase())
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Branch { name, .. } => write!(f, "refs/heads/{}", name),
            SourceRef::Tag { name, .. } => write!(f, "refs/tags/{}", name),
            SourceRef::Commit { sha } => f.write_str(sha),
        }
    }
}

fn parse_semver(name: &str) -> Option<semver::Version> {
    let version = name.strip_prefix('v').unwrap_or(name);
    semver::Version::parse(version).ok()
}

//! Image reference parsing.
//!
//! Parses references like `ghcr.io/org/node:22-alpine@sha256:…` into their
//! components, rejecting anything a registry would not accept.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;


/// Registry used when the reference names none.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Namespace for single-component Docker Hub names.
const OFFICIAL_NAMESPACE: &str = "library";

const MAX_TAG_LEN: usize = 128;

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname, optionally with port
    pub registry: String,
    /// Repository path (e.g. "library/node")
    pub repository: String,
    /// Tag, if one was given
    pub tag: Option<String>,
    /// Digest (`algorithm:hex`), if one was given
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supports:
    /// - `node` → docker.io/library/node
    /// - `node:22-alpine` → docker.io/library/node:22-alpine
    /// - `localhost:5000/base/node:22` → localhost:5000/base/node:22
    /// - `ghcr.io/org/node@sha256:…` → ghcr.io/org/node@sha256:…
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidBaseImage {
            image: reference.to_string(),
            reason: reason.to_string(),
        };

        if reference.is_empty() {
            return Err(invalid("empty reference"));
        }
        if reference.trim() != reference || reference.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }

        let (name_tag, digest) = match reference.split_once('@') {
            Some((name_tag, digest)) => {
                validate_digest(digest).map_err(|reason| invalid(&reason))?;
                (name_tag, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A colon after the last slash separates the tag; one before it is a port.
        let last_slash = name_tag.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name_tag[last_slash..].rfind(':') {
            Some(colon) => {
                let split = last_slash + colon;
                (&name_tag[..split], Some(&name_tag[split + 1..]))
            }
            None => (name_tag, None),
        };

        if let Some(tag) = tag {
            if !is_valid_tag(tag) {
                return Err(invalid("malformed tag"));
            }
        }

        let (registry, repository) = split_registry_repository(name).map_err(|r| invalid(&r))?;

        Ok(ImageReference {
            registry,
            repository,
            tag: tag.map(str::to_string),
            digest,
        })
    }

    /// Fully qualified form, with the registry spelled out.
    pub fn full_reference(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }

    /// Last path component of the repository (e.g. "node").
    pub fn name(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository)
    }
}

impl FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

/// Whether `tag` is a valid registry tag: `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`.
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {}
        _ => return false,
    }
    tag.len() <= MAX_TAG_LEN && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn validate_digest(digest: &str) -> std::result::Result<(), String> {
    let (algorithm, hex) = digest
        .split_once(':')
        .ok_or_else(|| "digest must be algorithm:hex".to_string())?;

    if algorithm.is_empty()
        || !algorithm
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '.' | '_' | '-'))
    {
        return Err(format!("invalid digest algorithm '{}'", algorithm));
    }
    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err("digest is not hex encoded".to_string());
    }
    if algorithm == "sha256" && hex.len() != 64 {
        return Err("sha256 digest must have 64 hex digits".to_string());
    }
    Ok(())
}

fn split_registry_repository(name: &str) -> std::result::Result<(String, String), String> {
    let (registry, path) = match name.split_once('/') {
        Some((first, rest)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            validate_host(first)?;
            (first.to_string(), rest.to_string())
        }
        _ => (DEFAULT_REGISTRY.to_string(), name.to_string()),
    };

    if path.is_empty() {
        return Err("empty repository".to_string());
    }
    for component in path.split('/') {
        validate_path_component(component)?;
    }

    let repository = if registry == DEFAULT_REGISTRY && !path.contains('/') {
        format!("{}/{}", OFFICIAL_NAMESPACE, path)
    } else {
        path
    };

    Ok((registry, repository))
}

fn validate_host(host: &str) -> std::result::Result<(), String> {
    let (hostname, port) = match host.rsplit_once(':') {
        Some((hostname, port)) => (hostname, Some(port)),
        None => (host, None),
    };
    if hostname.is_empty()
        || !hostname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(format!("invalid registry host '{}'", host));
    }
    if let Some(port) = port {
        if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid registry port in '{}'", host));
        }
    }
    Ok(())
}

/// Path components are lowercase alphanumerics joined by `.`, `_`, `__` or runs of `-`.
fn validate_path_component(component: &str) -> std::result::Result<(), String> {
    let err = || format!("invalid repository component '{}'", component);
    let bytes = component.as_bytes();

    let is_alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if bytes.is_empty() || !is_alnum(bytes[0]) || !is_alnum(bytes[bytes.len() - 1]) {
        return Err(err());
    }

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if is_alnum(b) {
            i += 1;
            continue;
        }
        // Separator run: "." or "_" or "__" or one or more "-"
        let start = i;
        while i < bytes.len() && !is_alnum(bytes[i]) {
            i += 1;
        }
        match &component[start..i] {
            "." | "_" | "__" => {}
            sep if sep.bytes().all(|c| c == b'-') => {}
            _ => return Err(err()),
        }
    }
    Ok(())
}

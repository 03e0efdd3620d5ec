//! Build matrix model
//!
//! A matrix file names every buildable variant; each variant expands into one
//! [`MatrixEntry`] per architecture. Entries are validated on construction and
//! immutable afterwards.

use crate::constants::platform;
use crate::error::{Error, Result};
use crate::reference::ImageReference;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

mod file;


pub use file::{MatrixFile, VariantSpec};

/// CPU architectures images are built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Architecture {
    #[serde(rename = "amd64")]
    Amd64,
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "arm/v7")]
    ArmV7,
    #[serde(rename = "ppc64le")]
    Ppc64le,
    #[serde(rename = "s390x")]
    S390x,
}

impl Architecture {
    pub const ALL: [Architecture; 5] = [
        Architecture::Amd64,
        Architecture::Arm64,
        Architecture::ArmV7,
        Architecture::Ppc64le,
        Architecture::S390x,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Amd64 => "amd64",
            Architecture::Arm64 => "arm64",
            Architecture::ArmV7 => "arm/v7",
            Architecture::Ppc64le => "ppc64le",
            Architecture::S390x => "s390x",
        }
    }

    /// Build platform string passed to the build tool
    pub fn platform(&self) -> &'static str {
        match self {
            Architecture::Amd64 => platform::LINUX_AMD64,
            Architecture::Arm64 => platform::LINUX_ARM64,
            Architecture::ArmV7 => platform::LINUX_ARM_V7,
            Architecture::Ppc64le => platform::LINUX_PPC64LE,
            Architecture::S390x => platform::LINUX_S390X,
        }
    }

    /// Form usable inside tags and file paths
    pub fn tag_safe(&self) -> &'static str {
        match self {
            Architecture::ArmV7 => "arm-v7",
            other => other.as_str(),
        }
    }
}

impl FromStr for Architecture {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // Accept both bare architectures and full linux/<arch> platforms
        let arch = s.strip_prefix("linux/").unwrap_or(s);
        match arch {
            "amd64" | "x86_64" => Ok(Architecture::Amd64),
            "arm64" | "arm64/v8" | "aarch64" => Ok(Architecture::Arm64),
            "arm/v7" | "arm-v7" | "armv7" => Ok(Architecture::ArmV7),
            "ppc64le" => Ok(Architecture::Ppc64le),
            "s390x" => Ok(Architecture::S390x),
            _ => Err(Error::UnsupportedArchitecture {
                arch: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publication tier; ordered from highest priority to lowest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Stable,
    Edge,
    Archived,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Edge => "edge",
            Channel::Archived => "archived",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a matrix entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId {
    pub base_image: String,
    pub variant: String,
    pub architecture: Architecture,
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.variant, self.architecture)
    }
}

/// One buildable image: a variant on one architecture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixEntry {
    base_image: String,
    base_ref: ImageReference,
    variant: String,
    architecture: Architecture,
    packages: Vec<String>,
    env_vars: BTreeMap<String, String>,
    channel: Channel,
}

impl MatrixEntry {
    /// Create a validated entry. Fails on a malformed base image, variant name,
    /// package name or environment variable.
    pub fn new(
        base_image: impl Into<String>,
        variant: impl Into<String>,
        architecture: Architecture,
        packages: Vec<String>,
        env_vars: impl IntoIterator<Item = (String, String)>,
        channel: Channel,
    ) -> Result<Self> {
        let base_image = base_image.into();
        let variant = variant.into();
        let base_ref = ImageReference::parse(&base_image)?;

        if !is_valid_variant(&variant) {
            return Err(Error::invalid_matrix(format!(
                "invalid variant name '{}'",
                variant
            )));
        }

        for package in &packages {
            if !is_valid_package(package) {
                return Err(Error::invalid_matrix(format!(
                    "variant '{}': invalid package name '{}'",
                    variant, package
                )));
            }
        }

        let mut env = BTreeMap::new();
        for (key, value) in env_vars {
            if !is_valid_env_key(&key) {
                return Err(Error::invalid_matrix(format!(
                    "variant '{}': invalid environment variable name '{}'",
                    variant, key
                )));
            }
            if value.contains(['\n', '\r']) {
                return Err(Error::invalid_matrix(format!(
                    "variant '{}': environment variable '{}' spans multiple lines",
                    variant, key
                )));
            }
            if env.insert(key.clone(), value).is_some() {
                return Err(Error::invalid_matrix(format!(
                    "variant '{}': environment variable '{}' set twice",
                    variant, key
                )));
            }
        }

        Ok(Self {
            base_image,
            base_ref,
            variant,
            architecture,
            packages,
            env_vars: env,
            channel,
        })
    }

    pub fn base_image(&self) -> &str {
        &self.base_image
    }

    pub fn base_ref(&self) -> &ImageReference {
        &self.base_ref
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env_vars
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn id(&self) -> EntryId {
        EntryId {
            base_image: self.base_image.clone(),
            variant: self.variant.clone(),
            architecture: self.architecture,
        }
    }
}

/// The validated, expanded build matrix
#[derive(Debug, Clone)]
pub struct Matrix {
    repository: String,
    default_branch: String,
    entries: Vec<MatrixEntry>,
    default_variants: BTreeMap<Channel, String>,
}

impl Matrix {
    /// Load and validate a matrix file
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading build matrix from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_matrix(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: MatrixFile = toml::from_str(content)
            .map_err(|e| Error::invalid_matrix(format!("failed to parse matrix: {}", e)))?;
        Self::from_file(file)
    }

    /// Expand a parsed matrix file into entries, ordered by variant name and
    /// then by the variant's architecture list.
    pub fn from_file(file: MatrixFile) -> Result<Self> {
        if !is_valid_variant(&file.repository) {
            return Err(Error::invalid_matrix(format!(
                "invalid repository name '{}'",
                file.repository
            )));
        }
        if file.default_branch.trim().is_empty() {
            return Err(Error::invalid_matrix("default_branch must not be empty"));
        }
        if file.variants.is_empty() {
            return Err(Error::invalid_matrix("matrix defines no variants"));
        }

        let mut entries = Vec::new();
        let mut per_channel: BTreeMap<Channel, Vec<&str>> = BTreeMap::new();
        let mut explicit_defaults: BTreeMap<Channel, &str> = BTreeMap::new();

        for (name, spec) in &file.variants {
            if spec.architectures.is_empty() {
                return Err(Error::invalid_matrix(format!(
                    "variant '{}' lists no architectures",
                    name
                )));
            }

            let mut seen = BTreeSet::new();
            for arch in &spec.architectures {
                let architecture: Architecture = arch.parse()?;
                if !seen.insert(architecture) {
                    return Err(Error::invalid_matrix(format!(
                        "variant '{}' lists architecture '{}' twice",
                        name, architecture
                    )));
                }
                entries.push(MatrixEntry::new(
                    spec.base_image.clone(),
                    name.clone(),
                    architecture,
                    spec.packages.clone(),
                    spec.env.clone(),
                    spec.channel,
                )?);
            }

            per_channel.entry(spec.channel).or_default().push(name);
            if spec.default {
                if let Some(previous) = explicit_defaults.insert(spec.channel, name) {
                    return Err(Error::invalid_matrix(format!(
                        "variants '{}' and '{}' are both the default for channel {}",
                        previous, name, spec.channel
                    )));
                }
            }
        }

        let mut default_variants = BTreeMap::new();
        for (channel, variants) in &per_channel {
            let default = match explicit_defaults.get(channel) {
                Some(name) => Some(*name),
                None if variants.len() == 1 => Some(variants[0]),
                None => None,
            };
            if let Some(name) = default {
                debug!("Default variant for channel {}: {}", channel, name);
                default_variants.insert(*channel, name.to_string());
            }
        }

        info!(
            "Matrix has {} entries across {} variants",
            entries.len(),
            file.variants.len()
        );

        Ok(Self {
            repository: file.repository,
            default_branch: file.default_branch,
            entries,
            default_variants,
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    pub fn entries(&self) -> &[MatrixEntry] {
        &self.entries
    }

    /// Default variant per channel; channels with several variants and no
    /// explicit default have none.
    pub fn default_variants(&self) -> &BTreeMap<Channel, String> {
        &self.default_variants
    }

    /// Keep only entries matching the given variants and architectures.
    /// Empty filters keep everything.
    pub fn select(&self, variants: &[String], architectures: &[Architecture]) -> Vec<MatrixEntry> {
        self.entries
            .iter()
            .filter(|e| variants.is_empty() || variants.iter().any(|v| v == e.variant()))
            .filter(|e| architectures.is_empty() || architectures.contains(&e.architecture()))
            .cloned()
            .collect()
    }
}

fn is_valid_variant(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-'))
}

/// Package names may carry a version pin (`curl=8.5.0-r0`) but nothing a shell
/// would interpret.
fn is_valid_package(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+' | '=' | ':' | '~'))
}

fn is_valid_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

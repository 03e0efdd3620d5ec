use crate::metrics::RetryPolicy;
use crate::tags::RegistryMapping;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Registry owners and namespaces
    #[serde(default)]
    pub registries: RegistryConfig,

    /// Build configuration
    #[serde(default)]
    pub build: BuildConfig,

    /// Image inspection and retry configuration
    #[serde(default)]
    pub inspect: InspectConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Owner of the repository on ghcr.io
    #[serde(default = "default_owner")]
    pub ghcr_owner: String,

    /// Namespace of the repository on Docker Hub
    #[serde(default = "default_owner")]
    pub dockerhub_namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build tool binary, looked up on PATH
    #[serde(default = "default_tool")]
    pub tool: String,

    /// Number of images built at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-image build timeout
    #[serde(default = "default_build_timeout_secs")]
    pub timeout_secs: u64,

    /// Build context directory; defaults to the current directory
    pub context: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Timeout of a single inspection
    #[serde(default = "default_inspect_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_owner() -> String {
    "imgmatrix".to_string()
}

fn default_tool() -> String {
    "docker".to_string()
}

fn default_concurrency() -> usize {
    2
}

fn default_build_timeout_secs() -> u64 {
    3600
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_inspect_timeout_secs() -> u64 {
    30
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ghcr_owner: default_owner(),
            dockerhub_namespace: default_owner(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            concurrency: default_concurrency(),
            timeout_secs: default_build_timeout_secs(),
            context: None,
        }
    }
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_inspect_timeout_secs(),
        }
    }
}

impl RegistryConfig {
    pub fn mapping(&self) -> RegistryMapping {
        RegistryMapping {
            ghcr_owner: self.ghcr_owner.clone(),
            dockerhub_namespace: self.dockerhub_namespace.clone(),
        }
    }
}

impl BuildConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl InspectConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// `<config dir>/imgmatrix/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("imgmatrix").join("config.toml"))
    }

    /// Load the user configuration, falling back to defaults when the file
    /// does not exist.
    pub fn load() -> anyhow::Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from(&config_path);
            }
        }
        Ok(Config::default())
    }

    /// Load an explicitly named configuration file; it must exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        if config.build.concurrency == 0 {
            anyhow::bail!("build.concurrency must be at least 1");
        }
        Ok(config)
    }
}

use super::Channel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// On-disk matrix layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatrixFile {
    /// Logical repository name shared by every variant (e.g. "node")
    pub repository: String,

    /// Branch whose pushes move the channel tags
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Variant name → variant definition
    pub variants: BTreeMap<String, VariantSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantSpec {
    pub base_image: String,

    #[serde(default = "default_channel")]
    pub channel: Channel,

    pub architectures: Vec<String>,

    #[serde(default)]
    pub packages: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Publish unqualified tags for this variant on its channel
    #[serde(default)]
    pub default: bool,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_channel() -> Channel {
    Channel::Stable
}

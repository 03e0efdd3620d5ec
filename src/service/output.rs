//! Files written under the output directory

use super::report::RunReport;
use crate::error::Result;
use crate::matrix::{EntryId, MatrixEntry};
use crate::metrics::ImageMetrics;
use crate::tags::{Registry, RegistryMapping, TagSet};
use crate::template::DockerfileSpec;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const TAGS_FILE: &str = "tags.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const REPORT_FILE: &str = "report.json";

/// `<out>/<variant>/<arch>/Dockerfile`
pub fn dockerfile_path(out_dir: &Path, entry: &MatrixEntry) -> PathBuf {
    out_dir
        .join(entry.variant())
        .join(entry.architecture().tag_safe())
        .join("Dockerfile")
}

pub async fn write_dockerfile(
    out_dir: &Path,
    entry: &MatrixEntry,
    spec: &DockerfileSpec,
) -> Result<PathBuf> {
    let path = dockerfile_path(out_dir, entry);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, spec.to_text()).await?;
    debug!("Wrote {}", path.display());
    Ok(path)
}

/// One line of the tag report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagReportEntry {
    pub entry: EntryId,
    pub tags: BTreeSet<String>,
    pub ghcr_repository: String,
    pub dockerhub_repository: String,
}

impl TagReportEntry {
    pub fn new(entry: EntryId, set: &TagSet, mapping: &RegistryMapping) -> Self {
        Self {
            entry,
            tags: set.tags.clone(),
            ghcr_repository: mapping.repository(Registry::Ghcr, &set.repository),
            dockerhub_repository: mapping.repository(Registry::Dockerhub, &set.repository),
        }
    }
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Write the tag, metrics and run reports of a pipeline run
pub fn write_reports(
    out_dir: &Path,
    report: &RunReport,
    mapping: &RegistryMapping,
) -> anyhow::Result<()> {
    let tags: Vec<TagReportEntry> = report
        .outcomes
        .iter()
        .filter_map(|o| {
            o.tags
                .as_ref()
                .map(|set| TagReportEntry::new(o.entry.clone(), set, mapping))
        })
        .collect();
    let metrics: Vec<&ImageMetrics> = report
        .outcomes
        .iter()
        .filter_map(|o| o.metrics.as_ref())
        .collect();

    write_json(&out_dir.join(TAGS_FILE), &tags)?;
    write_json(&out_dir.join(METRICS_FILE), &metrics)?;
    write_json(&out_dir.join(REPORT_FILE), report)?;
    info!(
        "Wrote {} tag sets and {} metrics records to {}",
        tags.len(),
        metrics.len(),
        out_dir.display()
    );
    Ok(())
}

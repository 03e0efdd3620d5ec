//! Per-entry outcomes and the run report

use crate::matrix::EntryId;
use crate::metrics::ImageMetrics;
use crate::tags::TagSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Pipeline stage an entry failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Render,
    Build,
    Tag,
    Collect,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Render => "render",
            Stage::Build => "build",
            Stage::Tag => "tag",
            Stage::Collect => "collect",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Succeeded,
    /// Built and tagged, but metrics could not be fully collected
    Degraded,
    Failed,
    Cancelled,
}

/// What happened to one matrix entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryOutcome {
    pub entry: EntryId,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    /// Wall-clock time of the build step, set once the build tool returns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ImageMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
}

impl EntryOutcome {
    /// An entry that has not finished yet; stages fill in the rest.
    pub(crate) fn started(entry: EntryId) -> Self {
        Self {
            entry,
            status: OutcomeStatus::Succeeded,
            dockerfile: None,
            dockerfile_digest: None,
            image_ref: None,
            build_duration_ms: None,
            tags: None,
            metrics: None,
            degraded_reason: None,
            failure: None,
        }
    }

    pub(crate) fn cancelled(entry: EntryId) -> Self {
        Self::started(entry).into_cancelled()
    }

    pub(crate) fn into_cancelled(mut self) -> Self {
        self.status = OutcomeStatus::Cancelled;
        self
    }

    pub(crate) fn into_failed(mut self, stage: Stage, message: impl Into<String>) -> Self {
        self.status = OutcomeStatus::Failed;
        self.failure = Some(StageFailure {
            stage,
            message: message.into(),
        });
        self
    }

    pub(crate) fn into_degraded(mut self, reason: impl Into<String>) -> Self {
        self.status = OutcomeStatus::Degraded;
        self.degraded_reason = Some(reason.into());
        self
    }

    /// Succeeded, possibly with degraded metrics
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            OutcomeStatus::Succeeded | OutcomeStatus::Degraded
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub degraded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Percentage of entries that succeeded, degraded ones included
    pub success_rate: f64,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[EntryOutcome]) -> Self {
        let count = |status| outcomes.iter().filter(|o| o.status == status).count();
        let total = outcomes.len();
        let succeeded = count(OutcomeStatus::Succeeded);
        let degraded = count(OutcomeStatus::Degraded);
        let success_rate = if total == 0 {
            0.0
        } else {
            (succeeded + degraded) as f64 / total as f64 * 100.0
        };
        Self {
            total,
            succeeded,
            degraded,
            failed: count(OutcomeStatus::Failed),
            cancelled: count(OutcomeStatus::Cancelled),
            success_rate,
        }
    }
}

/// Result of one pipeline run, outcomes in matrix order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub source_ref: String,
    pub summary: RunSummary,
    pub outcomes: Vec<EntryOutcome>,
}

impl RunReport {
    pub fn new(source_ref: String, outcomes: Vec<EntryOutcome>) -> Self {
        Self {
            generated_at: Utc::now(),
            source_ref,
            summary: RunSummary::from_outcomes(&outcomes),
            outcomes,
        }
    }

    /// True when every entry went through the whole pipeline
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(EntryOutcome::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&EntryId, &StageFailure)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.failure.as_ref().map(|f| (&o.entry, f)))
    }
}

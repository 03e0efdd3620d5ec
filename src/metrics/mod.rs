//! Structural metrics for built images.
//!
//! [`Collector`] inspects an image through a [`BuildTool`], retrying transient
//! failures, and [`normalize`] turns whatever shape the tool printed into
//! [`ImageMetrics`].

use crate::engine::BuildTool;
use crate::error::{Error, Result};
use crate::matrix::EntryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};


/// Default number of inspection attempts, first one included
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Metrics of one built image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetrics {
    pub image_digest: String,
    pub size_bytes: u64,
    pub layer_count: usize,
    pub created_at: Option<DateTime<Utc>>,
    pub source_matrix_entry: EntryId,
}

/// Bounded exponential backoff for transient inspection failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Sleep before the retry that follows failed attempt number `attempt`
    /// (1-based): `initial_backoff * 2^(attempt-1)`, capped at `max_backoff`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Collects [`ImageMetrics`] through a build tool. Keeps no state between
/// images, so one collector can serve every worker.
#[derive(Clone)]
pub struct Collector {
    tool: Arc<dyn BuildTool>,
    policy: RetryPolicy,
}

impl Collector {
    pub fn new(tool: Arc<dyn BuildTool>, policy: RetryPolicy) -> Self {
        Self { tool, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Inspect `image_ref` and normalize the result.
    ///
    /// `InspectionFailed` is retried until the policy's attempt budget runs
    /// out; every other error is returned as soon as it happens.
    pub async fn collect(&self, image_ref: &str, source: &EntryId) -> Result<ImageMetrics> {
        let attempts = self.policy.attempts();
        let mut attempt = 1;
        loop {
            debug!(
                "Inspecting {} with {} (attempt {}/{})",
                image_ref,
                self.tool.name(),
                attempt,
                attempts
            );
            match self.tool.inspect(image_ref).await {
                Ok(raw) => return normalize(image_ref, &raw, source),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!("{}; retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Turn raw inspection output into [`ImageMetrics`].
///
/// Understands Docker's `image inspect` keys (`Id`, `Size`, `RootFS.Layers`,
/// `Created`), lower-case OCI-style keys (`digest`, `size`, `layers`,
/// `created`) and `RepoDigests`. A missing digest or size is an
/// `IncompleteMetrics` error; layer count and creation time are optional.
pub fn normalize(image_ref: &str, raw: &Value, source: &EntryId) -> Result<ImageMetrics> {
    let incomplete = |field: &str| Error::IncompleteMetrics {
        image: image_ref.to_string(),
        field: field.to_string(),
    };

    let image_digest = digest_of(raw).ok_or_else(|| incomplete("digest"))?;
    let size_bytes = field(raw, &["Size", "size"])
        .and_then(size_of)
        .ok_or_else(|| incomplete("size"))?;
    let layer_count = layers_of(raw);
    let created_at = field(raw, &["Created", "created"])
        .and_then(Value::as_str)
        .and_then(|s| match DateTime::parse_from_rfc3339(s) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                debug!("Ignoring creation time {:?} of {}: {}", s, image_ref, e);
                None
            }
        });

    Ok(ImageMetrics {
        image_digest,
        size_bytes,
        layer_count,
        created_at,
        source_matrix_entry: source.clone(),
    })
}

fn field<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| raw.get(*k)).filter(|v| !v.is_null())
}

fn digest_of(raw: &Value) -> Option<String> {
    if let Some(d) = field(raw, &["digest", "Digest", "Id", "id"]).and_then(Value::as_str) {
        if !d.is_empty() {
            return Some(d.to_string());
        }
    }
    // "repo@sha256:..."
    field(raw, &["RepoDigests"])
        .and_then(Value::as_array)
        .and_then(|digests| digests.iter().find_map(Value::as_str))
        .and_then(|d| d.rsplit_once('@'))
        .map(|(_, digest)| digest.to_string())
}

fn layers_of(raw: &Value) -> usize {
    let layers = raw
        .get("RootFS")
        .and_then(|r| r.get("Layers"))
        .or_else(|| field(raw, &["layers", "Layers"]));
    match layers {
        Some(Value::Array(items)) => items.len(),
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as usize,
        _ => 0,
    }
}

fn size_of(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        Value::String(s) => parse_size(s),
        _ => None,
    }
}

/// Parse sizes like `"1024"`, `"12.5MB"`, `"3 KiB"`.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let number: f64 = number.parse().ok()?;
    let multiplier: u64 = match unit.trim() {
        "" | "B" => 1,
        "kB" | "KB" => 1_000,
        "MB" => 1_000_000,
        "GB" => 1_000_000_000,
        "KiB" => 1 << 10,
        "MiB" => 1 << 20,
        "GiB" => 1 << 30,
        _ => return None,
    };
    Some((number * multiplier as f64).round() as u64)
}

//! Scripted [`BuildTool`] for unit tests

use super::{BuildRequest, BuildTool};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub(crate) struct FakeTool {
    /// Builds whose tag contains one of these fail
    pub fail_builds_for: Vec<String>,
    /// Builds whose tag contains one of these panic
    pub panic_builds_for: Vec<String>,
    /// Builds never finish on their own; they wait for cancellation
    pub block_builds: bool,
    pub build_delay: Duration,
    /// Number of leading inspections that fail transiently
    pub transient_failures: u32,
    pub missing_image: bool,
    /// Inspection output; Docker-shaped output when unset
    pub raw: Option<Value>,

    pub builds: AtomicU32,
    pub inspections: AtomicU32,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    pub platforms: Mutex<Vec<String>>,
}

impl FakeTool {
    pub fn docker_output(image_ref: &str) -> Value {
        json!({
            "Id": format!("sha256:{}", sha256::digest(image_ref)),
            "RepoTags": [image_ref],
            "Size": 52_428_800u64,
            "Created": "2024-05-01T12:00:00.123456789Z",
            "RootFS": {
                "Type": "layers",
                "Layers": ["sha256:aaa", "sha256:bbb", "sha256:ccc"]
            }
        })
    }
}

#[async_trait]
impl BuildTool for FakeTool {
    async fn build(&self, request: &BuildRequest<'_>, cancel: &CancellationToken) -> Result<String> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.platforms
            .lock()
            .unwrap()
            .push(request.platform.to_string());
        if self.panic_builds_for.iter().any(|f| request.tag.contains(f.as_str())) {
            panic!("build tool crashed on {}", request.tag);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let outcome = if self.block_builds {
            cancel.cancelled().await;
            Err(Error::Cancelled)
        } else {
            tokio::select! {
                _ = tokio::time::sleep(self.build_delay) => Ok(()),
                _ = cancel.cancelled() => Err(Error::Cancelled),
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome?;

        if self.fail_builds_for.iter().any(|f| request.tag.contains(f.as_str())) {
            return Err(Error::BuildFailed {
                platform: request.platform.to_string(),
                reason: "exit status 1".to_string(),
            });
        }
        Ok(request.tag.to_string())
    }

    async fn inspect(&self, image_ref: &str) -> Result<Value> {
        let n = self.inspections.fetch_add(1, Ordering::SeqCst) + 1;
        if self.missing_image {
            return Err(Error::ImageNotFound {
                image: image_ref.to_string(),
            });
        }
        if n <= self.transient_failures {
            return Err(Error::InspectionFailed {
                image: image_ref.to_string(),
                reason: "daemon unavailable".to_string(),
            });
        }
        Ok(self
            .raw
            .clone()
            .unwrap_or_else(|| Self::docker_output(image_ref)))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

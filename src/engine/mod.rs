//! Build tool boundary
//!
//! The pipeline never talks to a container engine directly. It goes through
//! [`BuildTool`], which exposes exactly the two capabilities the pipeline
//! needs: build an image from Dockerfile text, and inspect a built image.

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

mod docker;

#[cfg(test)]
pub(crate) mod fake;
#[cfg(test)]
mod tests;

pub use docker::DockerCli;

/// Inputs for one image build
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    /// Dockerfile text
    pub dockerfile: &'a str,
    /// Build context directory
    pub context: &'a Path,
    /// Target platform, e.g. `linux/arm64`
    pub platform: &'a str,
    /// Local tag applied to the result
    pub tag: &'a str,
}

/// Container build engine capabilities.
///
/// Implementations must tolerate concurrent calls; each call is independent.
#[async_trait]
pub trait BuildTool: Send + Sync {
    /// Build an image and return a reference to it.
    ///
    /// Fails with `BuildFailed`, or `Cancelled` if `cancel` fires first, in
    /// which case the underlying build is aborted.
    async fn build(&self, request: &BuildRequest<'_>, cancel: &CancellationToken) -> Result<String>;

    /// Raw inspection output for a built image.
    ///
    /// Fails with `InspectionFailed` (transient) or `ImageNotFound`.
    async fn inspect(&self, image_ref: &str) -> Result<serde_json::Value>;

    /// Name used in logs
    fn name(&self) -> &str;
}

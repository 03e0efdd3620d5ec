use super::{BuildRequest, BuildTool};
use crate::error::{Error, Result};
use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const DEFAULT_INSPECT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`BuildTool`] backed by the docker CLI with buildx
pub struct DockerCli {
    binary: PathBuf,
    build_timeout: Duration,
    inspect_timeout: Duration,
}

impl DockerCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            build_timeout: DEFAULT_BUILD_TIMEOUT,
            inspect_timeout: DEFAULT_INSPECT_TIMEOUT,
        }
    }

    /// Find `program` on PATH (or accept it as a path)
    pub fn locate(program: &str) -> anyhow::Result<Self> {
        let binary = which::which(program)
            .with_context(|| format!("Build tool '{}' not found in PATH", program))?;
        debug!("Using build tool at {}", binary.display());
        Ok(Self::new(binary))
    }

    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    pub fn with_inspect_timeout(mut self, timeout: Duration) -> Self {
        self.inspect_timeout = timeout;
        self
    }
}

#[async_trait]
impl BuildTool for DockerCli {
    async fn build(&self, request: &BuildRequest<'_>, cancel: &CancellationToken) -> Result<String> {
        let failed = |reason: String| Error::BuildFailed {
            platform: request.platform.to_string(),
            reason,
        };

        let iid_dir = tempfile::tempdir()?;
        let iid_path = iid_dir.path().join("iid");

        let mut std_cmd = std::process::Command::new(&self.binary);
        std_cmd
            .arg("buildx")
            .arg("build")
            .arg("--platform")
            .arg(request.platform)
            .arg("--file")
            .arg("-")
            .arg("--tag")
            .arg(request.tag)
            .arg("--load")
            .arg("--iidfile")
            .arg(&iid_path)
            .arg(request.context)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so cancellation takes down buildx helpers too
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_cmd.process_group(0);
        }

        let mut cmd = Command::from(std_cmd);
        cmd.kill_on_drop(true);

        debug!("Running command: {:?}", cmd);
        info!("Building {} for {}", request.tag, request.platform);

        let mut child = cmd
            .spawn()
            .map_err(|e| failed(format!("failed to start {}: {}", self.binary.display(), e)))?;
        let pid = child.id();

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.dockerfile.as_bytes())
                .await
                .map_err(|e| failed(format!("failed to send Dockerfile: {}", e)))?;
        }

        let waited = tokio::select! {
            waited = tokio::time::timeout(self.build_timeout, child.wait_with_output()) => waited,
            _ = cancel.cancelled() => {
                warn!("Cancelling build of {} for {}", request.tag, request.platform);
                kill_process_group(pid).await;
                return Err(Error::Cancelled);
            }
        };

        let output = match waited {
            Ok(output) => output?,
            Err(_) => {
                kill_process_group(pid).await;
                return Err(failed(format!(
                    "timed out after {}s",
                    self.build_timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Build of {} failed!", request.tag);
            error!("stderr:\n{}", stderr);
            return Err(failed(last_line(&stderr)));
        }

        let iid = tokio::fs::read_to_string(&iid_path).await;
        let image_ref = image_ref_from_iid(iid, request.tag);
        info!("Built {} as {}", request.tag, image_ref);
        Ok(image_ref)
    }

    async fn inspect(&self, image_ref: &str) -> Result<serde_json::Value> {
        let transient = |reason: String| Error::InspectionFailed {
            image: image_ref.to_string(),
            reason,
        };

        let mut cmd = Command::new(&self.binary);
        cmd.arg("image")
            .arg("inspect")
            .arg(image_ref)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        debug!("Running command: {:?}", cmd);

        let output = tokio::time::timeout(self.inspect_timeout, cmd.output())
            .await
            .map_err(|_| {
                transient(format!(
                    "timed out after {}s",
                    self.inspect_timeout.as_secs()
                ))
            })?
            .map_err(|e| transient(format!("failed to run {}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_inspect_failure(image_ref, &stderr));
        }

        parse_inspect_output(image_ref, &output.stdout)
    }

    fn name(&self) -> &str {
        "docker"
    }
}

/// `docker image inspect` prints a JSON array with one object per image
/// The image id buildx wrote to the iid file, or `tag` when there is none
pub(super) fn image_ref_from_iid(iid: std::io::Result<String>, tag: &str) -> String {
    let iid = match iid {
        Ok(iid) => iid,
        Err(e) => {
            warn!("Could not read image id for {}, using the tag instead: {}", tag, e);
            return tag.to_string();
        }
    };
    match iid.trim() {
        "" => tag.to_string(),
        id => id.to_string(),
    }
}

pub(super) fn parse_inspect_output(image_ref: &str, stdout: &[u8]) -> Result<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_slice(stdout)?;
    match value {
        serde_json::Value::Array(mut items) => {
            if items.is_empty() {
                Err(Error::ImageNotFound {
                    image: image_ref.to_string(),
                })
            } else {
                Ok(items.swap_remove(0))
            }
        }
        other => Ok(other),
    }
}

pub(super) fn classify_inspect_failure(image_ref: &str, stderr: &str) -> Error {
    let lower = stderr.to_lowercase();
    if lower.contains("no such image") || lower.contains("no such object") {
        Error::ImageNotFound {
            image: image_ref.to_string(),
        }
    } else {
        Error::InspectionFailed {
            image: image_ref.to_string(),
            reason: last_line(stderr),
        }
    }
}

fn last_line(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no output")
        .trim()
        .to_string()
}

async fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    let result = Command::new("kill")
        .arg("-TERM")
        .arg("--")
        .arg(format!("-{}", pid))
        .status()
        .await;
    match result {
        Ok(status) if status.success() => debug!("Killed build process group {}", pid),
        Ok(_) => debug!("Build process group {} already gone", pid),
        Err(e) => error!("Error killing build process group {}: {}", pid, e),
    }
}

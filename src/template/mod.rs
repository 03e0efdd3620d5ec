//! Dockerfile template engine
//!
//! Renders a [`MatrixEntry`] into Dockerfile instructions. Rendering is a pure
//! function of the entry: no I/O, no clock and no environment reads, so equal
//! entries always produce byte-identical text.

use crate::constants::{label, user};
use crate::error::{Error, Result};
use crate::matrix::{Architecture, MatrixEntry};
use crate::reference::ImageReference;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

#[cfg(test)]
mod tests;

/// Instruction categories, in the order they appear in every Dockerfile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionBlock {
    Base,
    BuildArgs,
    Environment,
    Packages,
    User,
    Entrypoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub block: InstructionBlock,
    pub line: String,
}

/// A rendered Dockerfile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DockerfileSpec {
    instructions: Vec<Instruction>,
}

impl DockerfileSpec {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Blocks present, in order of first appearance
    pub fn blocks(&self) -> Vec<InstructionBlock> {
        let mut blocks: Vec<InstructionBlock> = Vec::new();
        for instruction in &self.instructions {
            if blocks.last() != Some(&instruction.block) {
                blocks.push(instruction.block);
            }
        }
        blocks
    }

    /// Lines belonging to one block
    pub fn block_lines(&self, block: InstructionBlock) -> Vec<&str> {
        self.instructions
            .iter()
            .filter(|i| i.block == block)
            .map(|i| i.line.as_str())
            .collect()
    }

    /// Dockerfile text, one instruction per line
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// sha256 of the Dockerfile text, used as a cache key in reports
    pub fn content_digest(&self) -> String {
        format!("sha256:{}", sha256::digest(self.to_text()))
    }
}

impl fmt::Display for DockerfileSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            writeln!(f, "{}", instruction.line)?;
        }
        Ok(())
    }
}

/// Package manager family of a base image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apk,
    Apt,
}

impl PackageManager {
    pub fn for_base(base: &ImageReference) -> Self {
        let is_alpine = base.name().contains("alpine")
            || base.tag.as_deref().is_some_and(|tag| tag.contains("alpine"));
        if is_alpine {
            PackageManager::Apk
        } else {
            PackageManager::Apt
        }
    }

    fn install(&self, packages: &[&str]) -> String {
        let list = packages.join(" ");
        match self {
            PackageManager::Apk => format!("RUN apk add --no-cache {}", list),
            PackageManager::Apt => format!(
                "RUN apt-get update && apt-get install -y --no-install-recommends {} && rm -rf /var/lib/apt/lists/*",
                list
            ),
        }
    }

    /// Create the non-root account unless the ids are already taken (official
    /// node images ship a `node` user with the same ids).
    fn create_user(&self) -> String {
        let (uid, gid, name) = (user::UID, user::GID, user::NAME);
        match self {
            PackageManager::Apk => format!(
                "RUN (getent group {gid} || addgroup -g {gid} -S {name}) && (getent passwd {uid} || adduser -u {uid} -S -D -G {name} -h /home/{name} {name})"
            ),
            PackageManager::Apt => format!(
                "RUN (getent group {gid} || groupadd --gid {gid} {name}) && (getent passwd {uid} || useradd --uid {uid} --gid {gid} --create-home --shell /bin/sh {name})"
            ),
        }
    }
}

/// Render an entry into a Dockerfile.
pub fn render(entry: &MatrixEntry) -> Result<DockerfileSpec> {
    // Already checked by MatrixEntry::new
    let base = ImageReference::parse(entry.base_image())?;
    let arch = entry.architecture();
    if !Architecture::ALL.contains(&arch) {
        return Err(Error::UnsupportedArchitecture {
            arch: arch.to_string(),
        });
    }

    let manager = PackageManager::for_base(&base);
    let mut out = Renderer::default();

    // Base image
    out.push(
        InstructionBlock::Base,
        format!("FROM --platform=$TARGETPLATFORM {}", entry.base_image()),
    );
    out.push(
        InstructionBlock::Base,
        format!("LABEL {}={}", label::BASE_NAME, quote(&base.full_reference())),
    );
    if let Some(digest) = &base.digest {
        out.push(
            InstructionBlock::Base,
            format!("LABEL {}={}", label::BASE_DIGEST, quote(digest)),
        );
    }

    // Platform placeholders filled in by the builder for each target platform
    for arg in ["TARGETPLATFORM", "TARGETOS", "TARGETARCH", "TARGETVARIANT"] {
        out.push(InstructionBlock::BuildArgs, format!("ARG {}", arg));
    }

    for (key, value) in entry.env_vars() {
        out.push(InstructionBlock::Environment, format!("ENV {}={}", key, quote(value)));
    }

    let packages: BTreeSet<&str> = entry.packages().iter().map(String::as_str).collect();
    if !packages.is_empty() {
        let packages: Vec<&str> = packages.into_iter().collect();
        out.push(InstructionBlock::Packages, manager.install(&packages));
    }

    out.push(InstructionBlock::User, manager.create_user());
    out.push(
        InstructionBlock::User,
        format!("USER {}:{}", user::UID, user::GID),
    );

    let (entrypoint, cmd) = entrypoint_for(entry.variant());
    out.push(InstructionBlock::Entrypoint, format!("ENTRYPOINT {}", exec_form(entrypoint)));
    out.push(InstructionBlock::Entrypoint, format!("CMD {}", exec_form(cmd)));

    Ok(out.finish())
}

/// Entrypoint and default command for a variant
pub fn entrypoint_for(variant: &str) -> (&'static [&'static str], &'static [&'static str]) {
    const ENTRYPOINT: &[&str] = &["docker-entrypoint.sh"];
    const NODE: &[&str] = &["node"];
    const SHELL: &[&str] = &["sh"];
    match variant {
        "dev" | "devcontainer" => (ENTRYPOINT, SHELL),
        _ => (ENTRYPOINT, NODE),
    }
}

#[derive(Default)]
struct Renderer {
    instructions: Vec<Instruction>,
}

impl Renderer {
    fn push(&mut self, block: InstructionBlock, line: String) {
        debug_assert!(
            self.instructions.last().map_or(true, |last| last.block <= block),
            "instruction block {:?} emitted out of order",
            block
        );
        self.instructions.push(Instruction { block, line });
    }

    fn finish(self) -> DockerfileSpec {
        DockerfileSpec {
            instructions: self.instructions,
        }
    }
}

/// Double-quoted value for ENV and LABEL. `$` is escaped so the value is
/// taken literally instead of being expanded by the builder.
fn quote(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$");
    format!("\"{}\"", escaped)
}

/// JSON array form of CMD/ENTRYPOINT; no variable expansion happens there
fn exec_form(args: &[&str]) -> String {
    let quoted: Vec<String> = args
        .iter()
        .map(|a| serde_json::Value::from(*a).to_string())
        .collect();
    format!("[{}]", quoted.join(", "))
}

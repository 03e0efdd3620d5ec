use crate::matrix::Architecture;
use crate::tags::{RegistryMapping, SourceRef};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "imgmatrix")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to <config dir>/imgmatrix/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render Dockerfiles for the build matrix
    Render {
        #[command(flatten)]
        matrix: MatrixArgs,

        /// Output directory for <variant>/<arch>/Dockerfile
        #[arg(short, long, default_value = "out")]
        out: PathBuf,
    },

    /// Print the registry tags each matrix entry gets for a source ref
    Tags {
        #[command(flatten)]
        matrix: MatrixArgs,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        registries: RegistryArgs,

        /// Write the tag report to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Render, build, tag and measure every matrix entry
    Build {
        #[command(flatten)]
        matrix: MatrixArgs,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        registries: RegistryArgs,

        /// Output directory for Dockerfiles and reports
        #[arg(short, long, default_value = "out")]
        out: PathBuf,

        /// Build context directory
        #[arg(long)]
        context: Option<PathBuf>,

        /// Number of images built at the same time
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Cancel the whole run after this many seconds
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,

        /// Build tool binary
        #[arg(long)]
        tool: Option<String>,
    },

    /// Collect metrics for an already built image
    Inspect {
        /// Image reference or id to inspect
        image: String,

        /// Path to the matrix file
        #[arg(short, long, env = "IMGMATRIX_MATRIX", default_value = "matrix.toml")]
        matrix: PathBuf,

        /// Variant the image was built from
        #[arg(long)]
        variant: String,

        /// Architecture the image was built for
        #[arg(long)]
        arch: Architecture,

        /// Build tool binary
        #[arg(long)]
        tool: Option<String>,
    },

    /// Show version information
    Version,
}

/// Which matrix to load and which of its entries to keep
#[derive(Args, Debug, Clone)]
pub struct MatrixArgs {
    /// Path to the matrix file
    #[arg(short, long, env = "IMGMATRIX_MATRIX", default_value = "matrix.toml")]
    pub matrix: PathBuf,

    /// Only these variants (comma-separated or repeated)
    #[arg(long, value_delimiter = ',')]
    pub variant: Vec<String>,

    /// Only these architectures (e.g. amd64, arm/v7)
    #[arg(long, value_delimiter = ',')]
    pub arch: Vec<Architecture>,
}

/// The source-control reference images are built from
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Full git ref, e.g. refs/heads/main or refs/tags/v1.2.3
    #[arg(long = "ref", env = "GITHUB_REF", value_name = "REF")]
    pub git_ref: Option<String>,

    /// Commit sha
    #[arg(long, env = "GITHUB_SHA")]
    pub sha: Option<String>,

    /// Git tag name; takes precedence over --branch and --ref
    #[arg(long)]
    pub tag: Option<String>,

    /// Branch name; takes precedence over --ref
    #[arg(long)]
    pub branch: Option<String>,
}

impl SourceArgs {
    /// Explicit `--tag`/`--branch` win over a full `--ref`
    pub fn source_ref(&self) -> Option<SourceRef> {
        if self.tag.is_some() || self.branch.is_some() {
            return SourceRef::resolve(
                self.tag.as_deref(),
                self.branch.as_deref(),
                self.sha.as_deref(),
            );
        }
        SourceRef::from_git_ref(self.git_ref.as_deref(), self.sha.as_deref())
    }
}

/// Registry owner overrides
#[derive(Args, Debug, Clone)]
pub struct RegistryArgs {
    /// Owner of the repository on ghcr.io
    #[arg(long, env = "GITHUB_REPOSITORY_OWNER")]
    pub ghcr_owner: Option<String>,

    /// Namespace of the repository on Docker Hub
    #[arg(long, env = "DOCKERHUB_NAMESPACE")]
    pub dockerhub_namespace: Option<String>,
}

impl RegistryArgs {
    pub fn apply(&self, mut mapping: RegistryMapping) -> RegistryMapping {
        if let Some(owner) = &self.ghcr_owner {
            mapping.ghcr_owner = owner.clone();
        }
        if let Some(namespace) = &self.dockerhub_namespace {
            mapping.dockerhub_namespace = namespace.clone();
        }
        mapping
    }
}

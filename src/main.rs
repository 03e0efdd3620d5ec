use anyhow::{Context, Result};
use clap::Parser;
use imgmatrix::{
    cli::{Cli, Commands, MatrixArgs, SourceArgs},
    config::Config,
    engine::DockerCli,
    matrix::{Matrix, MatrixEntry},
    metrics::Collector,
    service::{self, Pipeline, PipelineSettings, TagReportEntry},
    tags::{SourceRef, TagGenerator},
    template,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Render { matrix, out } => {
            let (_, entries) = load_entries(&matrix)?;
            let entries = service::buildable(entries);

            let mut failed = 0;
            for entry in &entries {
                let written = match template::render(entry) {
                    Ok(spec) => service::write_dockerfile(&out, entry, &spec).await,
                    Err(e) => Err(e),
                };
                match written {
                    Ok(path) => println!("{}", path.display()),
                    Err(e) => {
                        error!("Failed to render {}: {}", entry.id(), e);
                        failed += 1;
                    }
                }
            }
            info!("Rendered {} of {} Dockerfiles", entries.len() - failed, entries.len());
            if failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Tags {
            matrix,
            source,
            registries,
            output,
        } => {
            let (matrix, entries) = load_entries(&matrix)?;
            let source_ref = require_source(&source)?;
            let generator = TagGenerator::for_matrix(&matrix);
            let mapping = registries.apply(config.registries.mapping());

            let mut report = Vec::new();
            let mut failed = 0;
            for entry in &entries {
                match generator.derive(entry, &source_ref) {
                    Ok(set) => report.push(TagReportEntry::new(entry.id(), &set, &mapping)),
                    Err(e) => {
                        error!("Failed to derive tags for {}: {}", entry.id(), e);
                        failed += 1;
                    }
                }
            }

            match output {
                Some(path) => {
                    service::write_json(&path, &report)?;
                    info!("Wrote tag report to {}", path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&report)?),
            }
            if failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Build {
            matrix,
            source,
            registries,
            out,
            context,
            concurrency,
            timeout,
            tool,
        } => {
            let (matrix, entries) = load_entries(&matrix)?;
            let entries = service::buildable(entries);
            let source_ref = require_source(&source)?;
            let mapping = registries.apply(config.registries.mapping());

            let tool = DockerCli::locate(tool.as_deref().unwrap_or(&config.build.tool))?
                .with_build_timeout(config.build.timeout())
                .with_inspect_timeout(config.inspect.timeout());
            let settings = PipelineSettings {
                out_dir: out.clone(),
                context: context
                    .or_else(|| config.build.context.clone())
                    .unwrap_or_else(|| PathBuf::from(".")),
                concurrency: concurrency.unwrap_or(config.build.concurrency),
            };
            if settings.concurrency == 0 {
                anyhow::bail!("--concurrency must be at least 1");
            }
            let pipeline = Pipeline::new(
                Arc::new(tool),
                config.inspect.retry_policy(),
                TagGenerator::for_matrix(&matrix),
                source_ref,
                settings,
            );

            let cancel = CancellationToken::new();
            watch_for_cancellation(&cancel, timeout);

            let report = pipeline.run(entries, &cancel).await;
            service::write_reports(&out, &report, &mapping)?;

            let summary = &report.summary;
            eprintln!(
                "{} entries: {} succeeded, {} degraded, {} failed, {} cancelled",
                summary.total, summary.succeeded, summary.degraded, summary.failed, summary.cancelled
            );
            for (entry, failure) in report.failures() {
                eprintln!("  {} failed at {}: {}", entry, failure.stage, failure.message);
            }
            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Inspect {
            image,
            matrix,
            variant,
            arch,
            tool,
        } => {
            let matrix = load_matrix(&matrix)?;
            let entry = matrix
                .entries()
                .iter()
                .find(|e| e.variant() == variant && e.architecture() == arch)
                .with_context(|| format!("Matrix has no entry {}/{}", variant, arch))?;

            let tool = DockerCli::locate(tool.as_deref().unwrap_or(&config.build.tool))?
                .with_inspect_timeout(config.inspect.timeout());
            let collector = Collector::new(Arc::new(tool), config.inspect.retry_policy());
            let metrics = collector.collect(&image, &entry.id()).await?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
        Commands::Version => {
            println!("imgmatrix {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn load_matrix(path: &std::path::Path) -> Result<Matrix> {
    Matrix::load(path).with_context(|| format!("Failed to load matrix {}", path.display()))
}

/// Load the matrix and apply the variant/architecture filters
fn load_entries(args: &MatrixArgs) -> Result<(Matrix, Vec<MatrixEntry>)> {
    let matrix = load_matrix(&args.matrix)?;
    let entries = matrix.select(&args.variant, &args.arch);
    if entries.is_empty() {
        anyhow::bail!("No matrix entries match the given --variant/--arch filters");
    }
    Ok((matrix, entries))
}

fn require_source(args: &SourceArgs) -> Result<SourceRef> {
    let source = args
        .source_ref()
        .context("No source ref: pass --ref, --tag, --branch or --sha (or set GITHUB_REF/GITHUB_SHA)")?;
    info!("Source ref: {}", source);
    Ok(source)
}

/// Cancel on Ctrl-C, and after `timeout_secs` when given
fn watch_for_cancellation(cancel: &CancellationToken, timeout_secs: Option<u64>) {
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling outstanding builds");
            token.cancel();
        }
    });

    if let Some(secs) = timeout_secs {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            if !token.is_cancelled() {
                warn!("Run timed out after {}s, cancelling", secs);
                token.cancel();
            }
        });
    }
}

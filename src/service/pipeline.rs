//! Worker pool driving render → build → tag → collect over matrix entries

use super::output::write_dockerfile;
use super::report::{EntryOutcome, RunReport, Stage};
use crate::engine::{BuildRequest, BuildTool};
use crate::error::Error;
use crate::matrix::{Channel, EntryId, MatrixEntry};
use crate::metrics::{Collector, RetryPolicy};
use crate::tags::{SourceRef, TagGenerator};
use crate::template;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type Queue = Arc<Mutex<VecDeque<(usize, MatrixEntry)>>>;
type Done = mpsc::UnboundedSender<(usize, EntryOutcome)>;

/// Where a run reads from and writes to
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Root of the rendered Dockerfile tree
    pub out_dir: PathBuf,
    /// Build context passed to the build tool
    pub context: PathBuf,
    /// Number of worker tasks
    pub concurrency: usize,
}

#[derive(Clone)]
pub struct Pipeline {
    tool: Arc<dyn BuildTool>,
    collector: Collector,
    tags: TagGenerator,
    source: SourceRef,
    settings: PipelineSettings,
}

/// Drop entries whose Dockerfiles are not generated here. Archived images
/// only take part in tagging.
pub fn buildable(entries: Vec<MatrixEntry>) -> Vec<MatrixEntry> {
    entries
        .into_iter()
        .filter(|e| {
            let keep = e.channel() != Channel::Archived;
            if !keep {
                debug!("Skipping archived entry {}", e.id());
            }
            keep
        })
        .collect()
}

impl Pipeline {
    pub fn new(
        tool: Arc<dyn BuildTool>,
        retry: RetryPolicy,
        tags: TagGenerator,
        source: SourceRef,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            collector: Collector::new(tool.clone(), retry),
            tool,
            tags,
            source,
            settings,
        }
    }

    /// Run every entry through the pipeline.
    ///
    /// Entries are processed by a fixed pool of workers. One entry failing
    /// never stops the others. Once `cancel` fires, workers stop taking new
    /// entries, in-flight builds are aborted, and everything not finished is
    /// reported as cancelled. A worker that panics fails only the entry it
    /// was processing.
    pub async fn run(&self, entries: Vec<MatrixEntry>, cancel: &CancellationToken) -> RunReport {
        let ids: Vec<EntryId> = entries.iter().map(MatrixEntry::id).collect();
        let total = entries.len();
        let workers_count = self.settings.concurrency.clamp(1, total.max(1));
        info!(
            "Processing {} entries with {} workers using {}",
            total,
            workers_count,
            self.tool.name()
        );

        let queue: Queue = Arc::new(Mutex::new(entries.into_iter().enumerate().collect()));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();
        for worker in 0..workers_count {
            self.spawn_worker(&mut workers, worker, &queue, &done_tx, cancel);
        }

        // A panicked worker is replaced while entries are still queued
        let mut slots: Vec<Option<EntryOutcome>> = (0..total).map(|_| None).collect();
        let mut next_worker = workers_count;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
                if !cancel.is_cancelled() && !queue.lock().await.is_empty() {
                    self.spawn_worker(&mut workers, next_worker, &queue, &done_tx, cancel);
                    next_worker += 1;
                }
            }
            while let Ok((index, outcome)) = done_rx.try_recv() {
                slots[index] = Some(outcome);
            }
        }
        drop(done_tx);
        while let Some((index, outcome)) = done_rx.recv().await {
            slots[index] = Some(outcome);
        }

        // Still queued means never started; otherwise its worker died on it
        let unstarted: HashSet<usize> = queue.lock().await.iter().map(|(i, _)| *i).collect();
        let outcomes: Vec<EntryOutcome> = slots
            .into_iter()
            .zip(ids)
            .enumerate()
            .map(|(index, (slot, id))| match slot {
                Some(outcome) => outcome,
                None if unstarted.contains(&index) => EntryOutcome::cancelled(id),
                None => EntryOutcome::started(id).into_failed(Stage::Build, "worker task panicked"),
            })
            .collect();

        let report = RunReport::new(self.source.to_string(), outcomes);
        info!(
            "Run finished: {} succeeded, {} degraded, {} failed, {} cancelled ({:.1}%)",
            report.summary.succeeded,
            report.summary.degraded,
            report.summary.failed,
            report.summary.cancelled,
            report.summary.success_rate
        );
        report
    }

    fn spawn_worker(
        &self,
        workers: &mut JoinSet<()>,
        worker: usize,
        queue: &Queue,
        done: &Done,
        cancel: &CancellationToken,
    ) {
        let pipeline = self.clone();
        let queue = queue.clone();
        let done = done.clone();
        let cancel = cancel.clone();
        workers.spawn(async move { pipeline.work(worker, queue, done, cancel).await });
    }

    async fn work(self, worker: usize, queue: Queue, done: Done, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                debug!("Worker {} stopping: cancelled", worker);
                break;
            }
            let Some((index, entry)) = queue.lock().await.pop_front() else {
                break;
            };
            debug!("Worker {} picked up {}", worker, entry.id());
            let outcome = self.process(&entry, &cancel).await;
            if done.send((index, outcome)).is_err() {
                warn!("Dropping outcome for {}: run is no longer collecting", entry.id());
                break;
            }
        }
    }

    /// Run one entry through every stage, stopping at the first failure
    async fn process(&self, entry: &MatrixEntry, cancel: &CancellationToken) -> EntryOutcome {
        let id = entry.id();
        let mut outcome = EntryOutcome::started(id.clone());

        let spec = match template::render(entry) {
            Ok(spec) => spec,
            Err(e) => return fail(outcome, Stage::Render, e),
        };
        match write_dockerfile(&self.settings.out_dir, entry, &spec).await {
            Ok(path) => outcome.dockerfile = Some(path),
            Err(e) => return fail(outcome, Stage::Render, e),
        }
        outcome.dockerfile_digest = Some(spec.content_digest());

        let local_tag = format!(
            "{}:{}-{}",
            self.tags.policy().repository,
            entry.variant(),
            entry.architecture().tag_safe()
        );
        let dockerfile = spec.to_text();
        let request = BuildRequest {
            dockerfile: &dockerfile,
            context: &self.settings.context,
            platform: entry.architecture().platform(),
            tag: &local_tag,
        };
        let started = Instant::now();
        let built = self.tool.build(&request, cancel).await;
        outcome.build_duration_ms = Some(started.elapsed().as_millis() as u64);
        let image_ref = match built {
            Ok(image_ref) => image_ref,
            Err(Error::Cancelled) => return outcome.into_cancelled(),
            Err(e) => return fail(outcome, Stage::Build, e),
        };
        outcome.image_ref = Some(image_ref.clone());

        match self.tags.derive(entry, &self.source) {
            Ok(set) => outcome.tags = Some(set),
            Err(e) => return fail(outcome, Stage::Tag, e),
        }

        let collected = tokio::select! {
            collected = self.collector.collect(&image_ref, &id) => collected,
            _ = cancel.cancelled() => return outcome.into_cancelled(),
        };
        match collected {
            Ok(metrics) => {
                outcome.metrics = Some(metrics);
                info!("Finished {}", id);
                outcome
            }
            Err(e @ Error::IncompleteMetrics { .. }) => {
                warn!("Metrics for {} are incomplete: {}", id, e);
                outcome.into_degraded(e.to_string())
            }
            Err(e) => fail(outcome, Stage::Collect, e),
        }
    }
}

fn fail(outcome: EntryOutcome, stage: Stage, e: Error) -> EntryOutcome {
    error!("{} failed at {} stage: {}", outcome.entry, stage, e);
    outcome.into_failed(stage, e.to_string())
}

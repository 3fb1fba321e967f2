//! Job coordinator - drives one job from pending to a terminal state
//!
//! This module contains the per-job scheduling loop, including:
//! - Validating options and failing the job when they are unusable
//! - Dispatching by target mode (single, multiple, site)
//! - Seeding the site frontier from its root and walking it batch by batch
//! - Recording page outcomes and honoring cancellation between batches
//! - Persisting the finished job through the sink

use crate::config::ScrapeOptions;
use crate::crawler::frontier::{CrawlFrontier, FrontierEntry};
use crate::crawler::pipeline::{PageOutcome, PagePipeline};
use crate::crawler::scheduler::{FetchScheduler, RunEnd};
use crate::integrations::AssistantClient;
use crate::renderer::Renderer;
use crate::state::{Job, JobSummary, PageResult, Target};
use crate::storage::JobSink;
use crate::OrchestrationError;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Locks a shared job, recovering the record if a holder panicked
pub(crate) fn lock_job(job: &Mutex<Job>) -> MutexGuard<'_, Job> {
    job.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs a single job to completion
pub struct Coordinator {
    job: Arc<Mutex<Job>>,
    renderer: Arc<dyn Renderer>,
    assistant: Option<Arc<dyn AssistantClient>>,
    sink: Option<Arc<dyn JobSink>>,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Creates a coordinator for a pending job
    ///
    /// # Arguments
    ///
    /// * `job` - The shared job record; status snapshots read it concurrently
    /// * `renderer` - Renderer used for every page of the job
    /// * `cancel` - Token checked before each batch and during delays
    pub fn new(job: Arc<Mutex<Job>>, renderer: Arc<dyn Renderer>, cancel: CancellationToken) -> Self {
        Self {
            job,
            renderer,
            assistant: None,
            sink: None,
            cancel,
        }
    }

    pub fn with_assistant(mut self, assistant: Option<Arc<dyn AssistantClient>>) -> Self {
        self.assistant = assistant;
        self
    }

    pub fn with_sink(mut self, sink: Option<Arc<dyn JobSink>>) -> Self {
        self.sink = sink;
        self
    }

    /// Runs the job and returns its final summary
    ///
    /// Page failures are recorded as results. Only an [`OrchestrationError`]
    /// fails the job; cancellation completes it with `cancelled` set.
    pub async fn run(&self) -> JobSummary {
        let (target, options) = {
            let mut job = lock_job(&self.job);
            if let Err(e) = job.start() {
                tracing::warn!("Job {} not started: {}", job.id, e);
                return job.summary();
            }
            tracing::info!(
                "Job {} started: {} mode, {} target URL(s)",
                job.id,
                job.mode(),
                job.target.urls().len()
            );
            (job.target.clone(), job.options.clone())
        };

        let outcome = match options.validate() {
            Ok(()) => self.dispatch(&target, Arc::new(options)).await,
            Err(e) => Err(e),
        };
        self.finish(outcome).await
    }

    async fn dispatch(
        &self,
        target: &Target,
        options: Arc<ScrapeOptions>,
    ) -> Result<RunEnd, OrchestrationError> {
        let max_pages = options.max_pages as usize;
        let pipeline = Arc::new(PagePipeline::new(
            self.renderer.clone(),
            self.assistant.clone(),
            options.clone(),
        ));
        let scheduler = FetchScheduler::new(pipeline);

        match target {
            Target::Single(url) => {
                let entries = vec![FrontierEntry {
                    url: url.clone(),
                    depth: 0,
                }];
                Ok(scheduler
                    .run(entries, &self.cancel, |o| self.record(o.result))
                    .await)
            }
            Target::Multiple(urls) => {
                if urls.is_empty() {
                    return Err(OrchestrationError::EmptyTarget);
                }
                if urls.len() > max_pages {
                    tracing::info!(
                        "Target lists {} URLs; only the first {} will be fetched",
                        urls.len(),
                        max_pages
                    );
                }
                let entries = urls
                    .iter()
                    .take(max_pages)
                    .map(|url| FrontierEntry {
                        url: url.clone(),
                        depth: 0,
                    })
                    .collect();
                Ok(scheduler
                    .run(entries, &self.cancel, |o| self.record(o.result))
                    .await)
            }
            Target::Site(root) => self.crawl_site(root, &options, &scheduler).await,
        }
    }

    /// Walks a site outward from its root
    ///
    /// The root is fetched alone; if it fails the job fails, and if it
    /// redirected the frontier follows the host it landed on. Every later
    /// batch takes up to `max_concurrent` frontier entries. Results are
    /// recorded as soon as every earlier entry of the batch has resolved, so
    /// depths never decrease.
    async fn crawl_site(
        &self,
        root: &Url,
        options: &ScrapeOptions,
        scheduler: &FetchScheduler,
    ) -> Result<RunEnd, OrchestrationError> {
        let mut frontier = CrawlFrontier::new(root, options);
        let seed = frontier.next_batch(1);
        if self.cancel.is_cancelled() {
            return Ok(RunEnd::Cancelled);
        }

        let root_outcome = scheduler
            .run_batch(seed)
            .await
            .pop()
            .map(|(_, outcome)| outcome)
            .ok_or(OrchestrationError::EmptyTarget)?;

        if !root_outcome.result.is_success() {
            let reason = root_outcome
                .result
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string());
            self.record(root_outcome.result);
            return Err(OrchestrationError::RootUnreachable {
                url: root.to_string(),
                reason,
            });
        }
        if let Some(landed) = &root_outcome.final_url {
            frontier.rebase(landed);
        }
        self.absorb(&mut frontier, root_outcome);

        let mut batch_number = 1;
        while !frontier.is_exhausted() {
            if !scheduler.pause(&self.cancel).await {
                return Ok(RunEnd::Cancelled);
            }
            let batch = frontier.next_batch(scheduler.max_concurrent());
            if batch.is_empty() {
                break;
            }

            batch_number += 1;
            let size = batch.len();
            let mut ready = BTreeMap::new();
            let mut next_index = 0;
            scheduler
                .stream_batch(batch, |index, outcome| {
                    ready.insert(index, outcome);
                    while let Some(outcome) = ready.remove(&next_index) {
                        self.absorb(&mut frontier, outcome);
                        next_index += 1;
                    }
                })
                .await;

            tracing::info!(
                "Batch {}: {} pages, {} fetched, {} queued",
                batch_number,
                size,
                frontier.dequeued(),
                frontier.pending()
            );
        }

        Ok(RunEnd::Finished)
    }

    /// Offers an outcome's links to the frontier, then records its result
    fn absorb(&self, frontier: &mut CrawlFrontier, outcome: PageOutcome) {
        let accepted = frontier.offer(&outcome.links, outcome.result.depth);
        tracing::debug!(
            "{} exposed {} links, {} new",
            outcome.result.url,
            outcome.links.len(),
            accepted
        );
        self.record(outcome.result);
    }

    fn record(&self, result: PageResult) {
        tracing::debug!(
            "Recorded {} ({}, {}ms)",
            result.url,
            result.status,
            result.duration_ms
        );
        let mut job = lock_job(&self.job);
        if let Err(e) = job.record(result) {
            tracing::warn!("Job {}: result dropped: {}", job.id, e);
        }
    }

    /// Moves the job to its terminal state and hands it to the sink
    async fn finish(&self, outcome: Result<RunEnd, OrchestrationError>) -> JobSummary {
        let snapshot = {
            let mut job = lock_job(&self.job);
            let transition = match outcome {
                Ok(RunEnd::Finished) => job.complete(),
                Ok(RunEnd::Cancelled) => {
                    tracing::info!("Job {} cancelled", job.id);
                    match job.mark_cancelled() {
                        Ok(()) => job.complete(),
                        Err(e) => Err(e),
                    }
                }
                Err(e) => {
                    tracing::error!("Job {} failed: {}", job.id, e);
                    job.fail(&e)
                }
            };
            if let Err(e) = transition {
                tracing::warn!("Job {}: {}", job.id, e);
            }
            job.clone()
        };

        let summary = snapshot.summary();
        tracing::info!(
            "Job {} {}: {} pages ({} failed) in {}ms",
            summary.id,
            summary.status,
            summary.pages,
            summary.failed_pages,
            summary.total_time_ms.unwrap_or(0)
        );

        if let Some(sink) = self.sink.clone() {
            let id = snapshot.id;
            match tokio::task::spawn_blocking(move || sink.persist(&snapshot)).await {
                Ok(Ok(())) => tracing::debug!("Job {} persisted", id),
                Ok(Err(e)) => tracing::error!("Failed to persist job {}: {}", id, e),
                Err(e) => tracing::error!("Persisting job {} did not finish: {}", id, e),
            }
        }
        summary
    }
}

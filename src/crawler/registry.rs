//! Job registry and the public orchestrator surface
//!
//! `submit` returns as soon as the job is registered; the job itself runs on
//! a supervised tokio task. Each registry entry keeps the shared job record,
//! its cancellation token, and a token that fires when the task has ended
//! (normally or by panic), so any number of callers can `wait` on it.
//!
//! Screenshot handles in results resolve through [`Orchestrator::screenshot`]
//! while the orchestrator holds the image store the renderer writes to.
//! [`Orchestrator::shutdown`] ends running jobs and releases the renderer.

use crate::config::{Config, ScrapeOptions};
use crate::crawler::coordinator::{lock_job, Coordinator};
use crate::integrations::AssistantClient;
use crate::output::{self, ExportFormat};
use crate::renderer::{self, Renderer};
use crate::state::{Job, JobId, JobStatus, Target};
use crate::storage::{
    open_image_store, ImageHandle, ImageStore, JobSink, SqliteJobSink, StorageError,
};
use crate::{HarvestError, OrchestrationError, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

struct JobEntry {
    job: Arc<Mutex<Job>>,
    cancel: CancellationToken,
    finished: CancellationToken,
}

/// Accepts scrape requests and tracks every job it started
pub struct Orchestrator {
    renderer: Arc<dyn Renderer>,
    assistant: Option<Arc<dyn AssistantClient>>,
    sink: Option<Arc<dyn JobSink>>,
    images: Option<Arc<dyn ImageStore>>,
    jobs: Mutex<HashMap<JobId, Arc<JobEntry>>>,
}

impl Orchestrator {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self {
            renderer,
            assistant: None,
            sink: None,
            images: None,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches the assistant consulted for jobs with custom instructions
    pub fn with_assistant(mut self, assistant: Arc<dyn AssistantClient>) -> Self {
        self.assistant = Some(assistant);
        self
    }

    /// Attaches the sink that receives every job once it is terminal
    pub fn with_sink(mut self, sink: Arc<dyn JobSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Attaches the store the renderer saves screenshots to
    pub fn with_images(mut self, images: Arc<dyn ImageStore>) -> Self {
        self.images = Some(images);
        self
    }

    /// Builds an orchestrator from the loaded configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Renderer built, sink opened if configured
    /// * `Err(HarvestError)` - Renderer or database could not be initialized
    pub fn from_config(config: &Config) -> Result<Self> {
        let images = open_image_store(config.screenshots.directory.as_deref())?;
        let renderer = renderer::from_config(config, images.clone())?;
        let mut orchestrator = Self::new(renderer).with_images(images);
        if let Some(path) = &config.storage.database_path {
            let sink = SqliteJobSink::open(Path::new(path))?;
            tracing::info!("Persisting finished jobs to {}", path);
            orchestrator = orchestrator.with_sink(Arc::new(sink));
        }
        Ok(orchestrator)
    }

    fn entry(&self, id: JobId) -> Result<Arc<JobEntry>> {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(HarvestError::JobNotFound(id))
    }

    /// Registers a job and starts it in the background
    ///
    /// Must be called from within a tokio runtime. Option problems are not
    /// reported here: the job starts and then fails.
    pub fn submit(&self, target: Target, options: ScrapeOptions) -> JobId {
        let job = Job::new(target, options);
        let id = job.id;
        let entry = Arc::new(JobEntry {
            job: Arc::new(Mutex::new(job)),
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
        });

        let coordinator = Coordinator::new(
            entry.job.clone(),
            self.renderer.clone(),
            entry.cancel.clone(),
        )
        .with_assistant(self.assistant.clone())
        .with_sink(self.sink.clone());
        let finished = entry.finished.clone();

        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, entry);

        tokio::spawn(async move {
            let _done = finished.drop_guard();
            coordinator.run().await;
        });

        tracing::info!("Submitted job {}", id);
        id
    }

    /// Snapshot of a job, or `None` for an unknown id
    pub fn status(&self, id: JobId) -> Option<Job> {
        let entry = self.entry(id).ok()?;
        let job = lock_job(&entry.job);
        Some(job.clone())
    }

    /// Requests cancellation; takes effect before the job's next batch
    ///
    /// Cancelling a terminal job has no effect.
    pub fn cancel(&self, id: JobId) -> Result<()> {
        let entry = self.entry(id)?;
        if !lock_job(&entry.job).status().is_terminal() {
            tracing::info!("Cancelling job {}", id);
            entry.cancel.cancel();
        }
        Ok(())
    }

    /// Waits for a job's task to end and returns the final record
    ///
    /// A task that died before reaching a terminal state leaves the job
    /// failed with [`OrchestrationError::Aborted`].
    pub async fn wait(&self, id: JobId) -> Result<Job> {
        let entry = self.entry(id)?;
        entry.finished.cancelled().await;

        let mut job = lock_job(&entry.job);
        if !job.status().is_terminal() {
            tracing::error!("Job {} task ended while {}", id, job.status());
            if job.status() == JobStatus::Pending {
                job.start()?;
            }
            job.fail(&OrchestrationError::Aborted)?;
        }
        Ok(job.clone())
    }

    /// Serializes a job's results in the given format
    pub fn export(&self, id: JobId, format: ExportFormat) -> Result<Vec<u8>> {
        let entry = self.entry(id)?;
        let results = lock_job(&entry.job).results().to_vec();
        Ok(output::export(&results, format)?)
    }

    /// Loads the PNG bytes behind a screenshot handle
    pub fn screenshot(&self, handle: &ImageHandle) -> Result<Vec<u8>> {
        let images = self
            .images
            .as_ref()
            .ok_or_else(|| StorageError::ImageNotFound(handle.to_string()))?;
        Ok(images.get(handle)?)
    }

    /// Removes a terminal job from the registry and returns it
    ///
    /// Screenshots no other registered job refers to are released.
    pub fn delete(&self, id: JobId) -> Result<Job> {
        let (job, kept) = {
            let mut jobs = self
                .jobs
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let entry = jobs.get(&id).ok_or(HarvestError::JobNotFound(id))?;
            let job = lock_job(&entry.job).clone();
            if !job.status().is_terminal() {
                return Err(HarvestError::JobActive(id));
            }
            jobs.remove(&id);

            let kept: HashSet<ImageHandle> = jobs
                .values()
                .flat_map(|entry| screenshot_handles(&lock_job(&entry.job)))
                .collect();
            (job, kept)
        };

        if let Some(images) = &self.images {
            for handle in screenshot_handles(&job) {
                if kept.contains(&handle) {
                    continue;
                }
                if let Err(e) = images.release(&handle) {
                    tracing::warn!("Job {}: could not release {}: {}", id, handle, e);
                }
            }
        }
        Ok(job)
    }

    /// Cancels every active job, waits for them, then closes the renderer
    ///
    /// Browser sessions are quit here; no job can render afterwards.
    pub async fn shutdown(&self) {
        let active: Vec<JobId> = self
            .jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|(_, entry)| !lock_job(&entry.job).status().is_terminal())
            .map(|(id, _)| *id)
            .collect();

        for id in &active {
            if let Err(e) = self.cancel(*id) {
                tracing::warn!("Job {} not cancelled: {}", id, e);
            }
        }
        for id in active {
            if let Err(e) = self.wait(id).await {
                tracing::warn!("Job {} did not settle: {}", id, e);
            }
        }

        tracing::info!("Closing {} renderer", self.renderer.name());
        self.renderer.close().await;
    }

    /// Ids of every registered job
    pub fn job_ids(&self) -> Vec<JobId> {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}

fn screenshot_handles(job: &Job) -> Vec<ImageHandle> {
    job.results()
        .iter()
        .flat_map(|result| result.screenshots.values().cloned())
        .collect()
}

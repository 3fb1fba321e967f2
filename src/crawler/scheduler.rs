//! Fetch scheduler
//!
//! This module handles:
//! - Bounding in-flight renders to `max_concurrent`
//! - Splitting fixed URL lists into batches
//! - Pausing `request_delay_ms` between batches (never after the last)
//! - Checking the job's cancellation token before each batch
//!
//! A batch is a single future set polled together, not one task per URL.

use crate::crawler::frontier::FrontierEntry;
use crate::crawler::pipeline::{PageOutcome, PagePipeline};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a scheduled run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    Finished,
    Cancelled,
}

/// Dispatches renders in bounded batches
pub struct FetchScheduler {
    pipeline: Arc<PagePipeline>,
    max_concurrent: usize,
    delay: Duration,
}

impl FetchScheduler {
    pub fn new(pipeline: Arc<PagePipeline>) -> Self {
        let options = pipeline.options();
        let max_concurrent = options.max_concurrent.max(1) as usize;
        let delay = options.request_delay();
        Self {
            pipeline,
            max_concurrent,
            delay,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Fetches every entry with at most `max_concurrent` in flight
    ///
    /// `on_outcome` is called as each fetch resolves, with the index of its
    /// entry, so results land while the rest of the batch is still running.
    pub async fn stream_batch<F>(&self, entries: Vec<FrontierEntry>, mut on_outcome: F)
    where
        F: FnMut(usize, PageOutcome),
    {
        let pipeline = &self.pipeline;
        let mut outcomes = stream::iter(entries.into_iter().enumerate())
            .map(|(index, entry)| async move { (index, pipeline.fetch(entry).await) })
            .buffer_unordered(self.max_concurrent);
        while let Some((index, outcome)) = outcomes.next().await {
            on_outcome(index, outcome);
        }
    }

    /// Same as [`stream_batch`](Self::stream_batch), collecting outcomes in
    /// resolution order
    pub async fn run_batch(&self, entries: Vec<FrontierEntry>) -> Vec<(usize, PageOutcome)> {
        let mut outcomes = Vec::with_capacity(entries.len());
        self.stream_batch(entries, |index, outcome| outcomes.push((index, outcome)))
            .await;
        outcomes
    }

    /// Waits out the inter-batch delay
    ///
    /// Returns false if the job was cancelled before or during the wait.
    pub async fn pause(&self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        if self.delay.is_zero() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => !cancel.is_cancelled(),
            _ = cancel.cancelled() => false,
        }
    }

    /// Fetches a fixed list of entries batch by batch
    ///
    /// `on_outcome` sees every outcome as soon as it resolves. Stops before
    /// the next batch once `cancel` fires.
    pub async fn run<F>(
        &self,
        entries: Vec<FrontierEntry>,
        cancel: &CancellationToken,
        mut on_outcome: F,
    ) -> RunEnd
    where
        F: FnMut(PageOutcome),
    {
        let total = entries.len();
        for (batch_index, chunk) in entries.chunks(self.max_concurrent).enumerate() {
            if batch_index > 0 && !self.pause(cancel).await {
                return RunEnd::Cancelled;
            }
            if cancel.is_cancelled() {
                return RunEnd::Cancelled;
            }

            tracing::info!(
                "Batch {}: {} pages ({} of {} dispatched)",
                batch_index + 1,
                chunk.len(),
                (batch_index * self.max_concurrent + chunk.len()).min(total),
                total
            );
            self.stream_batch(chunk.to_vec(), |_, outcome| on_outcome(outcome))
                .await;
        }
        RunEnd::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScrapeOptions;
    use crate::renderer::{RenderRequest, RenderedPage, Renderer};
    use crate::PageFetchError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;
    use url::Url;

    /// Tracks the highest number of concurrent renders
    #[derive(Default)]
    struct GaugeRenderer {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for GaugeRenderer {
        async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, PageFetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);

            let index: u64 = request.url.path().trim_start_matches("/p").parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(5 + (index % 3) * 5)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(RenderedPage {
                markup: "<p>ok</p>".to_string(),
                ..Default::default()
            })
        }

        fn name(&self) -> &'static str {
            "gauge"
        }
    }

    fn entries(n: usize) -> Vec<FrontierEntry> {
        (0..n)
            .map(|i| FrontierEntry {
                url: Url::parse(&format!("https://example.test/p{}", i)).unwrap(),
                depth: 0,
            })
            .collect()
    }

    fn scheduler(renderer: Arc<GaugeRenderer>, k: u32, delay_ms: u64) -> FetchScheduler {
        let options = ScrapeOptions {
            max_concurrent: k,
            request_delay_ms: delay_ms,
            ..ScrapeOptions::default()
        };
        FetchScheduler::new(Arc::new(PagePipeline::new(renderer, None, Arc::new(options))))
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_limit() {
        let renderer = Arc::new(GaugeRenderer::default());
        let scheduler = scheduler(renderer.clone(), 3, 0);

        let mut seen = 0;
        let end = scheduler
            .run(entries(10), &CancellationToken::new(), |_| seen += 1)
            .await;

        assert_eq!(end, RunEnd::Finished);
        assert_eq!(seen, 10);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 10);
        assert!(renderer.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_run_batch_bounds_oversized_input() {
        let renderer = Arc::new(GaugeRenderer::default());
        let scheduler = scheduler(renderer.clone(), 2, 0);

        let outcomes = scheduler.run_batch(entries(7)).await;
        assert_eq!(outcomes.len(), 7);
        assert!(renderer.peak.load(Ordering::SeqCst) <= 2);

        let mut indices: Vec<usize> = outcomes.iter().map(|(i, _)| *i).collect();
        indices.sort();
        assert_eq!(indices, (0..7).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_batches() {
        let renderer = Arc::new(GaugeRenderer::default());
        let scheduler = scheduler(renderer, 2, 1000);

        let started = Instant::now();
        scheduler
            .run(entries(6), &CancellationToken::new(), |_| {})
            .await;
        let elapsed = started.elapsed();

        // three batches, two pauses
        assert!(elapsed >= Duration::from_millis(2000));
        assert!(elapsed < Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes_delivered_as_they_resolve() {
        let renderer = Arc::new(GaugeRenderer::default());
        let scheduler = scheduler(renderer.clone(), 3, 0);

        // p0 sleeps 5ms, p1 10ms, p2 15ms
        let mut order = Vec::new();
        let mut in_flight = Vec::new();
        scheduler
            .stream_batch(entries(3), |index, _| {
                order.push(index);
                in_flight.push(renderer.in_flight.load(Ordering::SeqCst));
            })
            .await;

        assert_eq!(order, vec![0, 1, 2]);
        // the first outcome arrives while the others are still rendering
        assert_eq!(in_flight[0], 2);
        assert_eq!(in_flight[2], 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_batch() {
        let renderer = Arc::new(GaugeRenderer::default());
        let scheduler = scheduler(renderer.clone(), 2, 50);
        let cancel = CancellationToken::new();

        let mut seen = 0;
        let end = scheduler
            .run(entries(6), &cancel, |_| {
                seen += 1;
                cancel.cancel();
            })
            .await;

        assert_eq!(end, RunEnd::Cancelled);
        assert_eq!(seen, 2);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);
    }
}

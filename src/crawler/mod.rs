//! Crawler module for job execution
//!
//! This module contains the scheduling side of a job, including:
//! - The site-mode frontier (visited set, FIFO queue, crawl boundaries)
//! - The per-page pipeline (render, encode, assistant call)
//! - Batch scheduling with bounded concurrency and inter-batch delays
//! - Per-job coordination from pending to a terminal state
//! - The orchestrator registry behind `submit / status / cancel / export`

mod coordinator;
mod frontier;
mod pipeline;
mod registry;
mod scheduler;

pub use coordinator::Coordinator;
pub use frontier::{CrawlFrontier, FrontierEntry};
pub use pipeline::{PageOutcome, PagePipeline};
pub use registry::Orchestrator;
pub use scheduler::{FetchScheduler, RunEnd};

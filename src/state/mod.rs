//! State module for tracking job progress
//!
//! # Components
//!
//! - `JobStatus`: Lifecycle of a job (pending, running, completed, failed)
//! - `PageStatus`: Outcome of a single page fetch
//! - `Job`: The job record, owning its results and errors

mod job;
mod job_status;

// Re-export main types
pub use job::{Job, JobError, JobId, JobMode, JobSummary, PageResult, Target};
pub use job_status::{JobStatus, PageStatus};

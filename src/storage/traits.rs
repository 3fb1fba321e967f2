//! Storage traits and error types
//!
//! This module defines the persistence collaborator interface and the
//! error types shared by every storage backend.

use crate::state::Job;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Job already persisted: {0}")]
    AlreadyPersisted(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Write-once sink for finished jobs
///
/// Called once per job, after it reaches a terminal state. Nothing reads
/// from the sink while jobs run.
pub trait JobSink: Send + Sync {
    /// Stores the job record and its results
    ///
    /// # Arguments
    ///
    /// * `job` - A job in `completed` or `failed` state
    fn persist(&self, job: &Job) -> StorageResult<()>;
}

//! Harvester: a scrape job orchestrator
//!
//! This crate turns a target (one URL, a list of URLs, or a site root) into
//! multi-format content artifacts: raw markup, plain text, markdown, a
//! structured JSON projection and rendered-page screenshots. Work is bounded
//! by per-job concurrency, depth and page ceilings, and individual page
//! failures never abort a job.

pub mod config;
pub mod crawler;
pub mod encoder;
pub mod integrations;
pub mod output;
pub mod renderer;
pub mod state;
pub mod storage;
pub mod url;

use crate::config::{ContentFormat, DeviceProfile};
use thiserror::Error;

/// Main error type for Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),

    #[error("Export error: {0}")]
    Export(#[from] output::ExportError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Job error: {0}")]
    Job(#[from] state::JobError),

    #[error("Job not found: {0}")]
    JobNotFound(state::JobId),

    #[error("Job {0} is still active")]
    JobActive(state::JobId),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// A single page could not be fetched or rendered.
///
/// Recorded on the page's result; never fatal to the job.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PageFetchError {
    #[error("Navigation timed out after {timeout_ms}ms: {url}")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Unsupported content type '{content_type}' at {url}")]
    UnsupportedContent { url: String, content_type: String },

    #[error("Renderer error for {url}: {message}")]
    Renderer { url: String, message: String },

    #[error("No renderer session available: {0}")]
    SessionUnavailable(String),
}

impl PageFetchError {
    /// The failure without its URL, for records already keyed by URL
    pub fn reason(&self) -> String {
        match self {
            Self::Timeout { timeout_ms, .. } => format!("Navigation timed out after {}ms", timeout_ms),
            Self::HttpStatus { status, .. } => format!("HTTP {}", status),
            Self::Network { message, .. } => format!("Network error: {}", message),
            Self::UnsupportedContent { content_type, .. } => {
                format!("Unsupported content type '{}'", content_type)
            }
            Self::Renderer { message, .. } => format!("Renderer error: {}", message),
            Self::SessionUnavailable(message) => {
                format!("No renderer session available: {}", message)
            }
        }
    }
}

/// A requested representation could not be produced.
///
/// Downgrades the affected field to absent; the page itself still succeeds.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Screenshot for {device} unavailable: {reason}")]
    Screenshot {
        device: DeviceProfile,
        reason: String,
    },

    #[error("Cannot produce {format} output: {reason}")]
    Format {
        format: ContentFormat,
        reason: String,
    },

    #[error("Assistant reply unavailable: {0}")]
    Assistant(String),
}

/// Fatal to the job: transitions it to `failed`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Target contains no URLs")]
    EmptyTarget,

    #[error("Invalid target URL '{url}': {source}")]
    InvalidTarget { url: String, source: UrlError },

    #[error("Site root {url} is unreachable: {reason}")]
    RootUnreachable { url: String, reason: String },

    #[error("Job task ended without reaching a terminal state")]
    Aborted,
}

/// Result type alias for Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, ScrapeOptions};
pub use crawler::Orchestrator;
pub use output::ExportFormat;
pub use state::{Job, JobId, JobMode, JobStatus, PageResult, PageStatus, Target};

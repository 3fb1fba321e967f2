//! Job record and its lifecycle
//!
//! A [`Job`] owns its results and errors. Every mutation goes through a
//! method that checks the lifecycle, so a terminal job cannot change.

use crate::config::{ContentFormat, DeviceProfile, ScrapeOptions};
use crate::encoder::PageMetadata;
use crate::state::{JobStatus, PageStatus};
use crate::storage::ImageHandle;
use crate::url::parse_target;
use crate::{OrchestrationError, PageFetchError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Opaque job identifier
pub type JobId = Uuid;

/// Lifecycle violations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job is already {0} and cannot be modified")]
    Finalized(JobStatus),

    #[error("Job is {0}; results are only recorded while running")]
    NotRunning(JobStatus),
}

/// How a job walks its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    Single,
    Multiple,
    Site,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Multiple => "multiple",
            Self::Site => "site",
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "multiple" => Ok(Self::Multiple),
            "site" => Ok(Self::Site),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// What a job scrapes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// One page
    Single(Url),
    /// A fixed list of pages, no link following
    Multiple(Vec<Url>),
    /// A site crawled outward from its root
    Site(Url),
}

impl Target {
    pub fn mode(&self) -> JobMode {
        match self {
            Self::Single(_) => JobMode::Single,
            Self::Multiple(_) => JobMode::Multiple,
            Self::Site(_) => JobMode::Site,
        }
    }

    pub fn urls(&self) -> Vec<&Url> {
        match self {
            Self::Single(url) | Self::Site(url) => vec![url],
            Self::Multiple(urls) => urls.iter().collect(),
        }
    }

    /// Builds a target from user-supplied URL strings
    ///
    /// Every URL is normalized; `single` and `site` take exactly one.
    pub fn from_inputs<S: AsRef<str>>(
        mode: JobMode,
        inputs: &[S],
    ) -> Result<Self, OrchestrationError> {
        let urls = inputs
            .iter()
            .map(|input| {
                parse_target(input.as_ref()).map_err(|source| OrchestrationError::InvalidTarget {
                    url: input.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        match (mode, urls.len()) {
            (_, 0) => Err(OrchestrationError::EmptyTarget),
            (JobMode::Multiple, _) => Ok(Self::Multiple(urls)),
            (JobMode::Single, 1) => Ok(Self::Single(urls[0].clone())),
            (JobMode::Site, 1) => Ok(Self::Site(urls[0].clone())),
            (mode, n) => Err(OrchestrationError::InvalidOptions(format!(
                "{} mode takes exactly one URL, got {}",
                mode, n
            ))),
        }
    }
}

/// Outcome of fetching one URL
///
/// A failed result carries no content, metadata or screenshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub url: Url,
    pub status: PageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub content: BTreeMap<ContentFormat, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub screenshots: BTreeMap<DeviceProfile, ImageHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_reply: Option<String>,
    pub depth: u32,
    pub duration_ms: u64,
    pub fetched_at: DateTime<Utc>,
}

impl PageResult {
    /// A failed fetch of `url`; the error text leaves the URL out
    pub fn failure(url: Url, depth: u32, error: &PageFetchError, duration_ms: u64) -> Self {
        Self {
            url,
            status: PageStatus::Failed,
            error: Some(error.reason()),
            title: None,
            content: BTreeMap::new(),
            screenshots: BTreeMap::new(),
            metadata: None,
            assistant_reply: None,
            depth,
            duration_ms,
            fetched_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PageStatus::Completed
    }
}

/// Counts reported by status queries and the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: JobId,
    pub mode: JobMode,
    pub status: JobStatus,
    pub pages: usize,
    pub failed_pages: usize,
    pub cancelled: bool,
    pub total_time_ms: Option<u64>,
}

/// One scrape request and everything it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub target: Target,
    pub options: ScrapeOptions,
    status: JobStatus,
    results: Vec<PageResult>,
    errors: Vec<String>,
    cancelled: bool,
    pub created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    total_time_ms: Option<u64>,
    /// Orchestration error that failed the job
    failure: Option<String>,
}

impl Job {
    /// Creates a pending job with a fresh id
    pub fn new(target: Target, options: ScrapeOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            options,
            status: JobStatus::Pending,
            results: Vec::new(),
            errors: Vec::new(),
            cancelled: false,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            total_time_ms: None,
            failure: None,
        }
    }

    pub fn mode(&self) -> JobMode {
        self.target.mode()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn results(&self) -> &[PageResult] {
        &self.results
    }

    /// Page errors as `"<url>: <message>"`
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn total_time_ms(&self) -> Option<u64> {
        self.total_time_ms
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            mode: self.mode(),
            status: self.status,
            pages: self.results.len(),
            failed_pages: self.results.iter().filter(|r| !r.is_success()).count(),
            cancelled: self.cancelled,
            total_time_ms: self.total_time_ms,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), JobError> {
        if self.status.is_terminal() {
            return Err(JobError::Finalized(self.status));
        }
        if !self.status.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    fn stamp_completion(&mut self) {
        let now = Utc::now();
        let start = self.started_at.unwrap_or(self.created_at);
        self.completed_at = Some(now);
        self.total_time_ms = Some((now - start).num_milliseconds().max(0) as u64);
    }

    /// pending → running
    pub fn start(&mut self) -> Result<(), JobError> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Appends a page outcome; failed pages also land in the error list
    pub fn record(&mut self, result: PageResult) -> Result<(), JobError> {
        if self.status != JobStatus::Running {
            return Err(if self.status.is_terminal() {
                JobError::Finalized(self.status)
            } else {
                JobError::NotRunning(self.status)
            });
        }
        if let Some(error) = &result.error {
            self.errors.push(format!("{}: {}", result.url, error));
        }
        self.results.push(result);
        Ok(())
    }

    /// running → completed
    pub fn complete(&mut self) -> Result<(), JobError> {
        self.transition(JobStatus::Completed)?;
        self.stamp_completion();
        Ok(())
    }

    /// running → failed
    pub fn fail(&mut self, error: &OrchestrationError) -> Result<(), JobError> {
        self.transition(JobStatus::Failed)?;
        self.failure = Some(error.to_string());
        self.stamp_completion();
        Ok(())
    }

    /// Flags the job as cancelled; it still ends `completed`
    pub fn mark_cancelled(&mut self) -> Result<(), JobError> {
        if self.status.is_terminal() {
            return Err(JobError::Finalized(self.status));
        }
        self.cancelled = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn completed_page(u: &str) -> PageResult {
        PageResult {
            url: url(u),
            status: PageStatus::Completed,
            error: None,
            title: Some("Title".to_string()),
            content: BTreeMap::from([(ContentFormat::Text, "body".to_string())]),
            screenshots: BTreeMap::new(),
            metadata: None,
            assistant_reply: None,
            depth: 0,
            duration_ms: 12,
            fetched_at: Utc::now(),
        }
    }

    fn running_job() -> Job {
        let mut job = Job::new(
            Target::Single(url("https://example.test/a")),
            ScrapeOptions::default(),
        );
        job.start().unwrap();
        job
    }

    #[test]
    fn test_lifecycle() {
        let mut job = Job::new(Target::Site(url("https://example.test/")), ScrapeOptions::default());
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.mode(), JobMode::Site);

        job.start().unwrap();
        assert!(job.started_at().is_some());
        job.record(completed_page("https://example.test/")).unwrap();
        job.complete().unwrap();

        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.completed_at().is_some());
        assert!(job.total_time_ms().is_some());
        assert_eq!(job.summary().pages, 1);
    }

    #[test]
    fn test_terminal_job_is_frozen() {
        let mut job = running_job();
        job.complete().unwrap();
        let snapshot = job.clone();

        assert_eq!(job.start(), Err(JobError::Finalized(JobStatus::Completed)));
        assert_eq!(
            job.fail(&OrchestrationError::EmptyTarget),
            Err(JobError::Finalized(JobStatus::Completed))
        );
        assert!(job.record(completed_page("https://example.test/b")).is_err());
        assert!(job.mark_cancelled().is_err());
        assert_eq!(job, snapshot);
    }

    #[test]
    fn test_cannot_skip_running() {
        let mut job = Job::new(Target::Single(url("https://example.test/")), ScrapeOptions::default());
        assert_eq!(
            job.complete(),
            Err(JobError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Completed
            })
        );
        assert_eq!(
            job.record(completed_page("https://example.test/")),
            Err(JobError::NotRunning(JobStatus::Pending))
        );
    }

    #[test]
    fn test_failed_pages_become_errors() {
        let mut job = running_job();
        let error = PageFetchError::HttpStatus {
            url: "https://example.test/gone".to_string(),
            status: 410,
        };
        job.record(PageResult::failure(url("https://example.test/gone"), 1, &error, 5))
            .unwrap();
        job.complete().unwrap();

        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.errors().len(), 1);
        assert_eq!(job.errors()[0], "https://example.test/gone: HTTP 410");
        assert_eq!(job.errors()[0].matches("example.test").count(), 1);
        assert_eq!(job.summary().failed_pages, 1);
        assert!(job.results()[0].content.is_empty());
    }

    #[test]
    fn test_fail_records_reason() {
        let mut job = running_job();
        job.fail(&OrchestrationError::InvalidOptions("max_pages must be >= 1".into()))
            .unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.failure().unwrap().contains("max_pages"));
    }

    #[test]
    fn test_cancelled_job_completes() {
        let mut job = running_job();
        job.mark_cancelled().unwrap();
        job.complete().unwrap();
        assert!(job.is_cancelled());
        assert_eq!(job.status(), JobStatus::Completed);
    }

    #[test]
    fn test_target_from_inputs() {
        let target = Target::from_inputs(JobMode::Multiple, &["https://a.test/x/", "b.test"]).unwrap();
        assert_eq!(
            target.urls().iter().map(|u| u.as_str()).collect::<Vec<_>>(),
            vec!["https://a.test/x", "https://b.test/"]
        );

        assert_eq!(
            Target::from_inputs::<&str>(JobMode::Single, &[]),
            Err(OrchestrationError::EmptyTarget)
        );
        assert!(matches!(
            Target::from_inputs(JobMode::Site, &["https://a.test", "https://b.test"]),
            Err(OrchestrationError::InvalidOptions(_))
        ));
        assert!(matches!(
            Target::from_inputs(JobMode::Single, &["ftp://a.test/file"]),
            Err(OrchestrationError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_page_result_json_shape() {
        let page = completed_page("https://example.test/a");
        let value = serde_json::to_value(&page).unwrap();

        assert_eq!(value["status"], "completed");
        assert_eq!(value["content"]["text"], "body");
        assert_eq!(value["durationMs"], 12);
        assert!(value.get("error").is_none());
        assert!(value.get("screenshots").is_none());

        let back: PageResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, page);
    }
}

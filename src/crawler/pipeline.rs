//! Per-page fetch pipeline
//!
//! Renders one URL under a hard timeout, encodes the requested formats and
//! optionally asks the assistant about the page. Every outcome, success or
//! failure, becomes a [`PageResult`]; nothing here can fail a job.

use crate::config::ScrapeOptions;
use crate::crawler::frontier::FrontierEntry;
use crate::encoder::{encode_extracted, encode_parsed, parse_document};
use crate::integrations::{page_transcript, AssistantClient};
use crate::renderer::{RenderRequest, RenderedPage, Renderer};
use crate::state::{PageResult, PageStatus};
use crate::{EncodingError, PageFetchError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

/// A resolved fetch: its result and the links it exposed
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub result: PageResult,
    /// Followable links, empty for failed pages
    pub links: Vec<Url>,
    /// Where the renderer ended up after redirects
    pub final_url: Option<Url>,
}

/// Renders and encodes pages for one job
pub struct PagePipeline {
    renderer: Arc<dyn Renderer>,
    assistant: Option<Arc<dyn AssistantClient>>,
    options: Arc<ScrapeOptions>,
}

impl PagePipeline {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        assistant: Option<Arc<dyn AssistantClient>>,
        options: Arc<ScrapeOptions>,
    ) -> Self {
        Self {
            renderer,
            assistant,
            options,
        }
    }

    pub fn options(&self) -> &ScrapeOptions {
        &self.options
    }

    /// Fetches one frontier entry
    pub async fn fetch(&self, entry: FrontierEntry) -> PageOutcome {
        let started = Instant::now();
        let timeout = self.options.page_timeout();
        let request = RenderRequest {
            url: entry.url.clone(),
            device: self.options.primary_device(),
            timeout,
            screenshot_devices: self.options.screenshot_devices(),
        };

        let rendered = match tokio::time::timeout(timeout, self.renderer.render(&request)).await {
            Ok(result) => result,
            Err(_) => Err(PageFetchError::Timeout {
                url: entry.url.to_string(),
                timeout_ms: self.options.page_timeout_ms,
            }),
        };

        match rendered {
            Ok(page) => {
                let links = page.links.clone();
                let final_url = page.final_url.clone();
                let result = self.build_result(entry, page, started).await;
                PageOutcome {
                    result,
                    links,
                    final_url,
                }
            }
            Err(e) => {
                tracing::warn!("Page {} failed: {}", entry.url, e);
                let elapsed = started.elapsed().as_millis() as u64;
                PageOutcome {
                    result: PageResult::failure(entry.url, entry.depth, &e, elapsed),
                    links: Vec::new(),
                    final_url: None,
                }
            }
        }
    }

    async fn build_result(
        &self,
        entry: FrontierEntry,
        page: RenderedPage,
        started: Instant,
    ) -> PageResult {
        let formats = &self.options.output_formats;
        let (encoded, metadata, title) = match &page.document {
            Some(document) => (encode_extracted(document, formats), None, page.title.clone()),
            None => {
                let base = page.final_url.as_ref().unwrap_or(&entry.url);
                let parsed = parse_document(&page.markup, base);
                let encoded = encode_parsed(&page.markup, &parsed, formats);
                let title = page.title.clone().or_else(|| parsed.title.clone());
                let metadata = Some(parsed.metadata).filter(|m| !m.is_empty());
                (encoded, metadata, title)
            }
        };

        for error in encoded.errors.iter().chain(page.screenshot_errors.iter()) {
            tracing::warn!("{}: {}", entry.url, error);
        }

        let assistant_reply = self.ask_assistant(&entry.url, &page.visible_text).await;

        PageResult {
            url: entry.url,
            status: PageStatus::Completed,
            error: None,
            title,
            content: encoded.content,
            screenshots: page.screenshots,
            metadata,
            assistant_reply,
            depth: entry.depth,
            duration_ms: started.elapsed().as_millis() as u64,
            fetched_at: Utc::now(),
        }
    }

    /// One assistant turn per page when the job carries instructions
    async fn ask_assistant(&self, url: &Url, page_text: &str) -> Option<String> {
        let instructions = self.options.custom_instructions.as_deref()?;
        let assistant = self.assistant.as_ref()?;

        let transcript = page_transcript(instructions, page_text);
        match assistant.reply(&transcript, Some(url.as_str())).await {
            Ok(reply) => {
                tracing::debug!(
                    "Assistant replied for {} ({} completion tokens)",
                    url,
                    reply.usage.completion_tokens
                );
                Some(reply.content)
            }
            Err(reason) => {
                tracing::warn!("{}: {}", url, EncodingError::Assistant(reason));
                None
            }
        }
    }
}

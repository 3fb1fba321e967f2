//! HTTP renderer
//!
//! Fetches pages with a plain HTTP client. No JavaScript runs, so this is
//! suited to static sites. It handles:
//! - Building the HTTP client with the configured user agent
//! - Redirects (reqwest-managed, max 10 hops)
//! - Error classification into [`PageFetchError`]
//! - Handing non-HTML bodies to a [`DocumentExtractor`] when one is attached

use crate::encoder::{parse_document, visible_text};
use crate::integrations::DocumentExtractor;
use crate::renderer::{RenderRequest, RenderedPage, Renderer};
use crate::{EncodingError, PageFetchError};
use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - Value sent in the `User-Agent` header
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Renderer backed by plain HTTP requests
pub struct HttpRenderer {
    client: Client,
    extractor: Option<Arc<dyn DocumentExtractor>>,
}

impl HttpRenderer {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent)?,
            extractor: None,
        })
    }

    /// Routes non-HTML responses through `extractor`
    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }
}

fn is_markup(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || mime == "text/html" || mime == "application/xhtml+xml"
}

/// Maps a transport error to the page error it represents
fn classify_error(url: &str, timeout: Duration, error: reqwest::Error) -> PageFetchError {
    if error.is_timeout() {
        PageFetchError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else if error.is_connect() {
        PageFetchError::Network {
            url: url.to_string(),
            message: "connection refused".to_string(),
        }
    } else if error.is_redirect() {
        PageFetchError::Network {
            url: url.to_string(),
            message: "too many redirects".to_string(),
        }
    } else {
        PageFetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, PageFetchError> {
        let url = request.url.as_str();
        let response = self
            .client
            .get(request.url.clone())
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| classify_error(url, request.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PageFetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let screenshot_errors = request
            .screenshot_devices
            .iter()
            .map(|&device| EncodingError::Screenshot {
                device,
                reason: "the http renderer cannot capture screenshots".to_string(),
            })
            .collect();

        if is_markup(&content_type) {
            let markup = response
                .text()
                .await
                .map_err(|e| classify_error(url, request.timeout, e))?;
            let parsed = parse_document(&markup, &final_url);
            debug!("Fetched {} ({} bytes, {} links)", final_url, markup.len(), parsed.links.len());

            return Ok(RenderedPage {
                title: parsed.title.clone(),
                visible_text: visible_text(&markup),
                links: parsed.crawl_links(),
                final_url: Some(final_url),
                markup,
                screenshots: Default::default(),
                screenshot_errors,
                document: None,
            });
        }

        let extractor = match &self.extractor {
            Some(extractor) if extractor.supports(&content_type) => extractor,
            _ => {
                return Err(PageFetchError::UnsupportedContent {
                    url: url.to_string(),
                    content_type,
                })
            }
        };

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_error(url, request.timeout, e))?;
        let document = extractor
            .extract(&bytes, &content_type)
            .await
            .map_err(|message| PageFetchError::Renderer {
                url: url.to_string(),
                message: format!("document extraction failed: {}", message),
            })?;
        debug!("Extracted {} document from {}", content_type, final_url);

        Ok(RenderedPage {
            title: document.metadata.get("title").cloned(),
            visible_text: document.text.clone(),
            final_url: Some(final_url),
            screenshot_errors,
            document: Some(document),
            ..Default::default()
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceProfile;
    use crate::integrations::ExtractedDocument;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct PdfExtractor;

    #[async_trait]
    impl DocumentExtractor for PdfExtractor {
        async fn extract(&self, bytes: &[u8], _declared_type: &str) -> Result<ExtractedDocument, String> {
            Ok(ExtractedDocument {
                text: format!("{} bytes of pdf", bytes.len()),
                ..Default::default()
            })
        }

        fn supports(&self, content_type: &str) -> bool {
            content_type.starts_with("application/pdf")
        }
    }

    fn request(server: &MockServer, route: &str) -> RenderRequest {
        RenderRequest {
            url: Url::parse(&format!("{}{}", server.uri(), route)).unwrap(),
            device: DeviceProfile::Desktop,
            timeout: Duration::from_secs(5),
            screenshot_devices: Vec::new(),
        }
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client("TestHarvester/1.0").is_ok());
    }

    #[test]
    fn test_is_markup() {
        assert!(is_markup("text/html; charset=utf-8"));
        assert!(is_markup("application/xhtml+xml"));
        assert!(is_markup(""));
        assert!(!is_markup("application/pdf"));
        assert!(!is_markup("image/png"));
    }

    #[tokio::test]
    async fn test_render_html_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"<html><head><title>Hello</title></head><body><p>Hi there</p><a href="/next">next</a></body></html>"#,
                "text/html",
            ))
            .mount(&server)
            .await;

        let renderer = HttpRenderer::new("TestHarvester/1.0").unwrap();
        let mut req = request(&server, "/page");
        req.screenshot_devices = vec![DeviceProfile::Mobile];
        let page = renderer.render(&req).await.unwrap();

        assert_eq!(page.title.as_deref(), Some("Hello"));
        assert_eq!(page.visible_text, "Hi there\nnext");
        assert_eq!(page.links.len(), 1);
        assert!(page.links[0].as_str().ends_with("/next"));
        assert!(page.screenshots.is_empty());
        assert_eq!(page.screenshot_errors.len(), 1);
    }

    #[tokio::test]
    async fn test_render_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let renderer = HttpRenderer::new("TestHarvester/1.0").unwrap();
        let result = renderer.render(&request(&server, "/missing")).await;
        assert!(matches!(result, Err(PageFetchError::HttpStatus { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_render_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let renderer = HttpRenderer::new("TestHarvester/1.0").unwrap();
        let mut req = request(&server, "/slow");
        req.timeout = Duration::from_millis(100);
        let result = renderer.render(&req).await;
        assert!(matches!(result, Err(PageFetchError::Timeout { timeout_ms: 100, .. })));
    }

    #[tokio::test]
    async fn test_non_html_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/report.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"))
            .mount(&server)
            .await;

        let renderer = HttpRenderer::new("TestHarvester/1.0").unwrap();
        let result = renderer.render(&request(&server, "/report.pdf")).await;
        assert!(matches!(result, Err(PageFetchError::UnsupportedContent { .. })));

        let renderer = renderer.with_extractor(Arc::new(PdfExtractor));
        let page = renderer.render(&request(&server, "/report.pdf")).await.unwrap();
        assert_eq!(page.visible_text, "8 bytes of pdf");
        assert!(page.document.is_some());
        assert!(page.markup.is_empty());
    }
}

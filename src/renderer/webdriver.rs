//! Headless browser renderer over WebDriver
//!
//! Each fetch checks a browser out of the [`SessionPool`], sizes the window
//! to the device profile, navigates with a page-load timeout and reads back
//! the rendered DOM. Screenshots are taken after resizing to each requested
//! device and stored through an [`ImageStore`].

use crate::config::DeviceProfile;
use crate::encoder::parse_document;
use crate::renderer::{RenderRequest, RenderedPage, Renderer, SessionFactory, SessionPool};
use crate::storage::ImageStore;
use crate::{EncodingError, PageFetchError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thirtyfour::prelude::*;
use tracing::{debug, error, warn};
use url::Url;

/// Starts Chrome sessions against a WebDriver endpoint
pub struct WebDriverFactory {
    server_url: String,
    headless: bool,
    user_agent: String,
}

impl WebDriverFactory {
    pub fn new(server_url: &str, headless: bool, user_agent: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            headless,
            user_agent: user_agent.to_string(),
        }
    }

    async fn start(&self) -> WebDriverResult<WebDriver> {
        let mut caps = DesiredCapabilities::chrome();
        caps.add_chrome_arg(&format!("--user-agent={}", self.user_agent))?;
        caps.add_chrome_arg("--disable-dev-shm-usage")?;
        caps.add_chrome_arg("--no-sandbox")?;
        if self.headless {
            caps.set_headless()?;
        }
        WebDriver::new(&self.server_url, caps).await
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    type Session = WebDriver;

    async fn create(&self) -> Result<WebDriver, String> {
        self.start()
            .await
            .map_err(|e| format!("failed to start browser at {}: {}", self.server_url, e))
    }

    async fn destroy(&self, session: WebDriver) {
        if let Err(e) = session.quit().await {
            error!("Error closing browser session: {}", e);
        }
    }
}

/// Renderer that drives pooled headless browsers
pub struct WebDriverRenderer {
    pool: SessionPool<WebDriverFactory>,
    images: Arc<dyn ImageStore>,
}

impl WebDriverRenderer {
    pub fn new(pool: SessionPool<WebDriverFactory>, images: Arc<dyn ImageStore>) -> Self {
        Self { pool, images }
    }

    pub fn pool(&self) -> &SessionPool<WebDriverFactory> {
        &self.pool
    }
}

async fn apply_viewport(driver: &WebDriver, device: DeviceProfile) -> WebDriverResult<()> {
    let (width, height) = device.viewport();
    driver.set_window_rect(0, 0, width.into(), height.into()).await
}

/// Navigates and reads back the rendered document
async fn load_page(driver: &WebDriver, request: &RenderRequest) -> WebDriverResult<RenderedPage> {
    apply_viewport(driver, request.device).await?;
    driver.set_page_load_timeout(request.timeout).await?;
    driver.goto(request.url.as_str()).await?;

    let markup = driver.source().await?;
    let title = driver.title().await?;
    let visible_text = driver.find(By::Tag("body")).await?.text().await?;
    let final_url = driver
        .current_url()
        .await
        .ok()
        .and_then(|current| Url::parse(&current.to_string()).ok())
        .unwrap_or_else(|| request.url.clone());

    let parsed = parse_document(&markup, &final_url);
    let title = Some(title.trim().to_string())
        .filter(|t| !t.is_empty())
        .or(parsed.title.clone());

    Ok(RenderedPage {
        final_url: Some(final_url),
        title,
        links: parsed.crawl_links(),
        markup,
        visible_text,
        ..Default::default()
    })
}

impl WebDriverRenderer {
    async fn capture(
        &self,
        driver: &WebDriver,
        devices: &[DeviceProfile],
        page: &mut RenderedPage,
    ) {
        let mut screenshots = BTreeMap::new();
        for &device in devices {
            let shot = async {
                apply_viewport(driver, device).await?;
                driver.screenshot_as_png().await
            }
            .await;

            let stored = shot
                .map_err(|e| e.to_string())
                .and_then(|png| self.images.put(&png).map_err(|e| e.to_string()));
            match stored {
                Ok(handle) => {
                    screenshots.insert(device, handle);
                }
                Err(reason) => {
                    warn!("Screenshot for {} failed: {}", device, reason);
                    page.screenshot_errors
                        .push(EncodingError::Screenshot { device, reason });
                }
            }
        }
        page.screenshots = screenshots;
    }
}

#[async_trait]
impl Renderer for WebDriverRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, PageFetchError> {
        let session = self.pool.checkout().await?;

        let mut page = match load_page(&session, request).await {
            Ok(page) => page,
            Err(e) => {
                // Session is dropped unfinished and discarded
                let message = e.to_string();
                let lowered = message.to_ascii_lowercase();
                return Err(if lowered.contains("timeout") || lowered.contains("timed out") {
                    PageFetchError::Timeout {
                        url: request.url.to_string(),
                        timeout_ms: request.timeout.as_millis() as u64,
                    }
                } else {
                    PageFetchError::Renderer {
                        url: request.url.to_string(),
                        message,
                    }
                });
            }
        };

        if !request.screenshot_devices.is_empty() {
            self.capture(&session, &request.screenshot_devices, &mut page)
                .await;
        }

        debug!(
            "Rendered {} in browser ({} screenshots)",
            request.url,
            page.screenshots.len()
        );
        session.finish();
        Ok(page)
    }

    fn name(&self) -> &'static str {
        "webdriver"
    }

    async fn close(&self) {
        debug!("Closing {} idle browser session(s)", self.pool.idle_count());
        self.pool.close().await;
    }
}

//! Renderer clients
//!
//! A renderer turns a URL into rendered markup plus the bits the pipeline
//! needs from a live page:
//! - final URL after redirects
//! - title and visible text
//! - followable links
//! - screenshots, one per requested device profile
//!
//! Two implementations exist: [`HttpRenderer`] (plain fetch, no JavaScript)
//! and [`WebDriverRenderer`] (headless browser sessions from a
//! [`SessionPool`]).

mod http;
mod pool;
mod webdriver;

pub use http::{build_http_client, HttpRenderer};
pub use pool::{PooledSession, SessionFactory, SessionPool};
pub use webdriver::{WebDriverFactory, WebDriverRenderer};

use crate::config::{Config, DeviceProfile, RendererKind};
use crate::integrations::ExtractedDocument;
use crate::storage::{ImageHandle, ImageStore};
use crate::{EncodingError, HarvestError, PageFetchError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// What to render and how
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub url: Url,
    /// Viewport used for navigation
    pub device: DeviceProfile,
    /// Navigation timeout handed to the backend
    pub timeout: Duration,
    /// Devices to capture, empty for none
    pub screenshot_devices: Vec<DeviceProfile>,
}

/// A successfully rendered page
#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    pub final_url: Option<Url>,
    pub title: Option<String>,
    pub markup: String,
    pub visible_text: String,
    pub links: Vec<Url>,
    pub screenshots: BTreeMap<DeviceProfile, ImageHandle>,
    /// Requested screenshots that could not be taken
    pub screenshot_errors: Vec<EncodingError>,
    /// Set when the response was a non-markup document
    pub document: Option<ExtractedDocument>,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Renders one page
    ///
    /// Failures are returned as [`PageFetchError`]; implementations never
    /// panic past this boundary.
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, PageFetchError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Releases backend resources such as browser sessions
    ///
    /// Called once no more jobs will run. Stateless renderers keep the
    /// default, which does nothing.
    async fn close(&self) {}
}

/// Builds the renderer selected in the configuration
///
/// Screenshots go to `images`, which the caller keeps to resolve handles.
pub fn from_config(
    config: &Config,
    images: Arc<dyn ImageStore>,
) -> Result<Arc<dyn Renderer>, HarvestError> {
    match config.renderer.kind {
        RendererKind::Http => Ok(Arc::new(HttpRenderer::new(&config.renderer.user_agent)?)),
        RendererKind::Webdriver => {
            let factory = WebDriverFactory::new(
                &config.renderer.webdriver_url,
                config.renderer.headless,
                &config.renderer.user_agent,
            );
            let pool = SessionPool::new(factory, config.renderer.sessions);
            Ok(Arc::new(WebDriverRenderer::new(pool, images)))
        }
    }
}

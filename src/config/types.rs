use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Main configuration structure for Harvester
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub screenshots: ScreenshotConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Options applied to jobs submitted without explicit options
    #[serde(default)]
    pub defaults: ScrapeOptions,
}

/// Which renderer backs page fetches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// Plain HTTP fetch, no JavaScript
    #[default]
    Http,
    /// Headless browser driven over WebDriver
    Webdriver,
}

/// Renderer configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct RendererConfig {
    pub kind: RendererKind,

    /// WebDriver endpoint (chromedriver, selenium)
    pub webdriver_url: String,

    /// Number of browser sessions in the pool
    pub sessions: usize,

    pub headless: bool,

    /// User agent sent by the HTTP renderer and passed to the browser
    pub user_agent: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            kind: RendererKind::Http,
            webdriver_url: "http://localhost:4444".to_string(),
            sessions: 3,
            headless: true,
            user_agent: format!("Harvester/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Screenshot storage configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ScreenshotConfig {
    /// Directory for content-addressed PNG files; in-memory when absent
    pub directory: Option<String>,
}

/// Persistence configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite database receiving terminal jobs; no persistence when absent
    pub database_path: Option<String>,
}

/// A named viewport used for rendering and screenshot capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceProfile {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceProfile {
    /// Viewport size in CSS pixels as (width, height)
    pub fn viewport(&self) -> (u32, u32) {
        match self {
            DeviceProfile::Mobile => (375, 667),
            DeviceProfile::Tablet => (768, 1024),
            DeviceProfile::Desktop => (1920, 1080),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceProfile::Mobile => "mobile",
            DeviceProfile::Tablet => "tablet",
            DeviceProfile::Desktop => "desktop",
        }
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-page content representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Html,
    #[serde(alias = "plain-text")]
    Text,
    Markdown,
    Json,
    Csv,
}

impl ContentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentFormat::Html => "html",
            ContentFormat::Text => "text",
            ContentFormat::Markdown => "markdown",
            ContentFormat::Json => "json",
            ContentFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-job scrape options
///
/// Closed set of fields: unknown keys are rejected when deserializing, and
/// every field has an explicit default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct ScrapeOptions {
    /// Capture a screenshot per requested device profile
    pub take_screenshots: bool,

    pub device_profiles: BTreeSet<DeviceProfile>,

    /// Representations produced for every completed page
    pub output_formats: BTreeSet<ContentFormat>,

    /// Ceiling on pages fetched by a job (site and multiple modes)
    pub max_pages: u32,

    /// Deepest link level followed from a site root (root is depth 0)
    pub max_depth: u32,

    pub same_origin_only: bool,

    /// Pause between consecutive batches (milliseconds)
    pub request_delay_ms: u64,

    /// Maximum renders in flight at once
    pub max_concurrent: u32,

    /// Hard navigation timeout per page (milliseconds)
    pub page_timeout_ms: u64,

    /// Instructions forwarded to the assistant for each completed page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            take_screenshots: false,
            device_profiles: BTreeSet::from([DeviceProfile::Desktop]),
            output_formats: BTreeSet::from([
                ContentFormat::Html,
                ContentFormat::Text,
                ContentFormat::Markdown,
            ]),
            max_pages: 100,
            max_depth: 3,
            same_origin_only: true,
            request_delay_ms: 1000,
            max_concurrent: 3,
            page_timeout_ms: 30_000,
            custom_instructions: None,
        }
    }
}

impl ScrapeOptions {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout_ms)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Devices to capture, empty when screenshots are off
    pub fn screenshot_devices(&self) -> Vec<DeviceProfile> {
        if self.take_screenshots {
            self.device_profiles.iter().copied().collect()
        } else {
            Vec::new()
        }
    }

    /// Checks the options a job will run with
    pub fn validate(&self) -> Result<(), crate::OrchestrationError> {
        super::validation::validate_options(self)
    }

    /// Device used for navigation: desktop when requested, else the first profile
    pub fn primary_device(&self) -> DeviceProfile {
        if self.device_profiles.contains(&DeviceProfile::Desktop) {
            DeviceProfile::Desktop
        } else {
            self.device_profiles
                .iter()
                .next()
                .copied()
                .unwrap_or(DeviceProfile::Desktop)
        }
    }
}

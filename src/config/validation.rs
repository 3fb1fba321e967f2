use crate::config::types::{Config, RendererConfig, RendererKind, ScrapeOptions};
use crate::{ConfigError, OrchestrationError};
use url::Url;

/// Upper bound on `max-concurrent`
pub const MAX_CONCURRENT_LIMIT: u32 = 100;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_renderer_config(&config.renderer)?;
    validate_storage_path(config.storage.database_path.as_deref(), "database_path")?;
    validate_storage_path(config.screenshots.directory.as_deref(), "screenshots directory")?;
    validate_options(&config.defaults)
        .map_err(|e| ConfigError::Validation(format!("[defaults] {}", e)))?;

    if config.renderer.kind == RendererKind::Webdriver
        && config.defaults.take_screenshots
        && config.screenshots.directory.is_none()
    {
        return Err(ConfigError::Validation(
            "[defaults] take-screenshots requires [screenshots] directory".to_string(),
        ));
    }
    Ok(())
}

/// Validates per-job options
///
/// Called at submission time; a failure here transitions the job to
/// `failed` before any page is fetched.
pub fn validate_options(options: &ScrapeOptions) -> Result<(), OrchestrationError> {
    if options.max_concurrent < 1 || options.max_concurrent > MAX_CONCURRENT_LIMIT {
        return Err(OrchestrationError::InvalidOptions(format!(
            "max_concurrent must be between 1 and {}, got {}",
            MAX_CONCURRENT_LIMIT, options.max_concurrent
        )));
    }

    if options.max_pages < 1 {
        return Err(OrchestrationError::InvalidOptions(format!(
            "max_pages must be >= 1, got {}",
            options.max_pages
        )));
    }

    if options.page_timeout_ms == 0 {
        return Err(OrchestrationError::InvalidOptions(
            "page_timeout_ms must be greater than zero".to_string(),
        ));
    }

    if options.output_formats.is_empty() {
        return Err(OrchestrationError::InvalidOptions(
            "output_formats cannot be empty".to_string(),
        ));
    }

    if options.take_screenshots && options.device_profiles.is_empty() {
        return Err(OrchestrationError::InvalidOptions(
            "take_screenshots requires at least one device profile".to_string(),
        ));
    }

    Ok(())
}

/// Validates renderer configuration
fn validate_renderer_config(config: &RendererConfig) -> Result<(), ConfigError> {
    if config.sessions < 1 {
        return Err(ConfigError::Validation(format!(
            "renderer sessions must be >= 1, got {}",
            config.sessions
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.kind == RendererKind::Webdriver {
        let url = Url::parse(&config.webdriver_url).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid webdriver_url '{}': {}",
                config.webdriver_url, e
            ))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "webdriver_url must use http or https, got '{}'",
                url.scheme()
            )));
        }
    }

    Ok(())
}

/// Rejects paths that are present but blank
fn validate_storage_path(path: Option<&str>, name: &str) -> Result<(), ConfigError> {
    match path {
        Some(p) if p.trim().is_empty() => Err(ConfigError::Validation(format!(
            "{} cannot be empty when set",
            name
        ))),
        _ => Ok(()),
    }
}

//! Configuration module for Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and defines the per-job [`ScrapeOptions`].
//!
//! # Example
//!
//! ```no_run
//! use harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Jobs default to {} concurrent renders", config.defaults.max_concurrent);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, ContentFormat, DeviceProfile, RendererConfig, RendererKind, ScrapeOptions,
    ScreenshotConfig, StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

pub use validation::{validate_options, MAX_CONCURRENT_LIMIT};

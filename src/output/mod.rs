//! Output module for exporting job results
//!
//! This module handles:
//! - Serializing a job's result set to JSON, CSV, markdown, HTML or text
//! - File extension and MIME type for every export format
//!
//! Every format except JSON works from the same flattened view: each result
//! becomes an ordered map of its top-level fields, with nested values kept
//! as JSON.

mod html;
mod markdown;
mod tabular;
mod text;

use crate::state::PageResult;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while exporting results
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write output: {0}")]
    Write(String),
}

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

/// Serialization targets for a job's result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Json,
    Csv,
    Markdown,
    Html,
    Text,
}

impl ExportFormat {
    pub fn all() -> [Self; 5] {
        [Self::Json, Self::Csv, Self::Markdown, Self::Html, Self::Text]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Text => "text",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Markdown => "md",
            Self::Html => "html",
            Self::Text => "txt",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
            Self::Markdown => "text/markdown",
            Self::Html => "text/html",
            Self::Text => "text/plain",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "markdown" | "md" => Ok(Self::Markdown),
            "html" => Ok(Self::Html),
            "text" | "txt" => Ok(Self::Text),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Serializes results in the given format
///
/// # Arguments
///
/// * `results` - Page results in job order
/// * `format` - Target representation
///
/// # Returns
///
/// * `Ok(Vec<u8>)` - UTF-8 encoded document; CSV of an empty set is empty
/// * `Err(ExportError)` - Serialization failed
pub fn export(results: &[PageResult], format: ExportFormat) -> ExportResult<Vec<u8>> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_vec_pretty(results)?),
        ExportFormat::Csv => tabular::to_csv(&records(results)?),
        ExportFormat::Markdown => Ok(markdown::to_markdown(&records(results)?).into_bytes()),
        ExportFormat::Html => Ok(html::to_html(&records(results)?).into_bytes()),
        ExportFormat::Text => Ok(text::to_text(&records(results)?).into_bytes()),
    }
}

pub(crate) type Record = Map<String, Value>;

/// Flattens results into field maps in declaration order
fn records(results: &[PageResult]) -> ExportResult<Vec<Record>> {
    results
        .iter()
        .map(|result| match serde_json::to_value(result)? {
            Value::Object(map) => Ok(map),
            other => Err(ExportError::Write(format!(
                "page result serialized as {}",
                other
            ))),
        })
        .collect()
}

/// Cell text for a value: strings verbatim, null empty, anything else JSON
pub(crate) fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

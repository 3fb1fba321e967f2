//! URL handling module for Harvester
//!
//! Canonical URL form used as crawl identity: two URLs that normalize to the
//! same value are the same page.

mod normalize;

pub use normalize::{normalize, normalize_url, same_host};

use crate::UrlError;
use url::Url;

/// Parses and normalizes a user-supplied target URL
///
/// Unlike discovered links, targets must be absolute; a bare host such as
/// `example.test` is accepted and given an `https` scheme.
pub fn parse_target(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Parse("empty URL".to_string()));
    }

    match normalize_url(trimmed) {
        Err(UrlError::Parse(_)) if !trimmed.contains("://") => {
            normalize_url(&format!("https://{}", trimmed))
        }
        other => other,
    }
}

//! Content encoder
//!
//! Turns rendered markup into the per-page representations a job asked
//! for. Encoding is deterministic: the same markup and formats always give
//! byte-identical output.

mod document;
mod markdown;
mod text;

pub use document::{parse_document, resolve_link, Heading, Image, Link, PageMetadata, ParsedDocument};
pub use markdown::to_markdown;
pub use text::visible_text;

pub(crate) use markdown::{code_span, fenced};

use crate::config::ContentFormat;
use crate::integrations::ExtractedDocument;
use crate::EncodingError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use url::Url;

/// Representations produced for one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedContent {
    pub content: BTreeMap<ContentFormat, String>,
    /// Requested formats that could not be produced
    pub errors: Vec<EncodingError>,
}

impl EncodedContent {
    fn insert(&mut self, format: ContentFormat, result: Result<String, EncodingError>) {
        match result {
            Ok(value) => {
                self.content.insert(format, value);
            }
            Err(e) => self.errors.push(e),
        }
    }
}

/// Structured projection emitted for the `json` format
#[derive(Debug, Serialize)]
struct Projection<'a> {
    title: Option<&'a str>,
    description: Option<&'a str>,
    headings: &'a [Heading],
    links: &'a [Link],
    images: &'a [Image],
}

/// Encodes rendered markup into the requested formats
///
/// # Arguments
///
/// * `markup` - The page markup as rendered
/// * `base_url` - URL used to resolve relative links in the projections
/// * `formats` - Requested representations
pub fn encode(markup: &str, base_url: &Url, formats: &BTreeSet<ContentFormat>) -> EncodedContent {
    encode_parsed(markup, &parse_document(markup, base_url), formats)
}

/// Same as [`encode`], reusing a document the caller already parsed
pub fn encode_parsed(
    markup: &str,
    parsed: &ParsedDocument,
    formats: &BTreeSet<ContentFormat>,
) -> EncodedContent {
    let mut encoded = EncodedContent::default();
    for &format in formats {
        let result = match format {
            ContentFormat::Html => Ok(markup.to_string()),
            ContentFormat::Text => Ok(visible_text(markup)),
            ContentFormat::Markdown => Ok(to_markdown(markup)),
            ContentFormat::Json => json_projection(parsed),
            ContentFormat::Csv => link_table(&parsed.links),
        };
        encoded.insert(format, result);
    }
    encoded
}

/// Encodes a non-markup document produced by the extraction collaborator
///
/// Only text-like formats apply: `html` and `csv` are reported as errors.
pub fn encode_extracted(
    document: &ExtractedDocument,
    formats: &BTreeSet<ContentFormat>,
) -> EncodedContent {
    let mut encoded = EncodedContent::default();
    for &format in formats {
        let result = match format {
            ContentFormat::Text | ContentFormat::Markdown => Ok(document.text.clone()),
            ContentFormat::Json => serde_json::to_string_pretty(&document.structured_data)
                .map_err(|e| EncodingError::Format {
                    format,
                    reason: e.to_string(),
                }),
            ContentFormat::Html | ContentFormat::Csv => Err(EncodingError::Format {
                format,
                reason: "source is not a markup document".to_string(),
            }),
        };
        encoded.insert(format, result);
    }
    encoded
}

fn json_projection(doc: &ParsedDocument) -> Result<String, EncodingError> {
    let projection = Projection {
        title: doc.title.as_deref(),
        description: doc.metadata.description.as_deref(),
        headings: &doc.headings,
        links: &doc.links,
        images: &doc.images,
    };
    serde_json::to_string_pretty(&projection).map_err(|e| EncodingError::Format {
        format: ContentFormat::Json,
        reason: e.to_string(),
    })
}

/// One `text,href` row per link
fn link_table(links: &[Link]) -> Result<String, EncodingError> {
    let to_error = |reason: String| EncodingError::Format {
        format: ContentFormat::Csv,
        reason,
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["text", "href"])
        .map_err(|e| to_error(e.to_string()))?;
    for link in links {
        writer
            .write_record([link.text.as_str(), link.href.as_str()])
            .map_err(|e| to_error(e.to_string()))?;
    }
    let bytes = writer.into_inner().map_err(|e| to_error(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| to_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    const PAGE: &str = r#"<html><head><title>Docs</title>
        <meta name="description" content="All the docs"></head>
        <body><h1>Welcome</h1><p>Start <a href="/start">here, now</a>.</p>
        <img src="/logo.png" alt="logo"></body></html>"#;

    fn base() -> Url {
        Url::parse("https://example.test/").unwrap()
    }

    fn formats(list: &[ContentFormat]) -> BTreeSet<ContentFormat> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_only_requested_formats() {
        let encoded = encode(PAGE, &base(), &formats(&[ContentFormat::Html, ContentFormat::Text]));
        assert_eq!(encoded.content.len(), 2);
        assert_eq!(encoded.content[&ContentFormat::Html], PAGE);
        assert_eq!(encoded.content[&ContentFormat::Text], "Welcome\nStart here, now.");
        assert!(!encoded.content.contains_key(&ContentFormat::Markdown));
        assert!(encoded.errors.is_empty());
    }

    #[test]
    fn test_json_projection() {
        let encoded = encode(PAGE, &base(), &formats(&[ContentFormat::Json]));
        let value: Value = serde_json::from_str(&encoded.content[&ContentFormat::Json]).unwrap();

        assert_eq!(value["title"], "Docs");
        assert_eq!(value["description"], "All the docs");
        assert_eq!(value["headings"][0]["level"], 1);
        assert_eq!(value["links"][0]["href"], "https://example.test/start");
        assert_eq!(value["links"][0]["text"], "here, now");
        assert_eq!(value["images"][0]["src"], "https://example.test/logo.png");
    }

    #[test]
    fn test_csv_link_table_quotes_commas() {
        let encoded = encode(PAGE, &base(), &formats(&[ContentFormat::Csv]));
        assert_eq!(
            encoded.content[&ContentFormat::Csv],
            "text,href\n\"here, now\",https://example.test/start\n"
        );
    }

    #[test]
    fn test_encoding_is_idempotent() {
        let all = formats(&[
            ContentFormat::Html,
            ContentFormat::Text,
            ContentFormat::Markdown,
            ContentFormat::Json,
            ContentFormat::Csv,
        ]);
        assert_eq!(encode(PAGE, &base(), &all), encode(PAGE, &base(), &all));
    }

    #[test]
    fn test_encode_extracted_document() {
        let document = ExtractedDocument {
            text: "Quarterly report".to_string(),
            structured_data: serde_json::json!({"pages": 3}),
            metadata: Default::default(),
        };
        let encoded = encode_extracted(
            &document,
            &formats(&[ContentFormat::Html, ContentFormat::Text, ContentFormat::Json]),
        );

        assert_eq!(encoded.content[&ContentFormat::Text], "Quarterly report");
        assert!(encoded.content[&ContentFormat::Json].contains("\"pages\": 3"));
        assert!(!encoded.content.contains_key(&ContentFormat::Html));
        assert!(matches!(
            encoded.errors.as_slice(),
            [EncodingError::Format { format: ContentFormat::Html, .. }]
        ));
    }
}

//! Parsed-DOM extraction of links and metadata
//!
//! This module parses markup once and extracts:
//! - Links (from `<a>` tags and canonical links), typed and absolute
//! - Page title and `<meta>` metadata
//! - Headings and images for the structured projection

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

/// Descriptive metadata read from the document head
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl PageMetadata {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.keywords.is_empty()
            && self.author.is_none()
            && self.language.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// An anchor resolved against the page URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub text: String,
    pub href: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub src: String,
    pub alt: String,
}

/// Everything extracted from one document
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    /// The page title (from `<title>`, falling back to the first `<h1>`)
    pub title: Option<String>,
    pub metadata: PageMetadata,
    pub headings: Vec<Heading>,
    /// Followable anchors in document order
    pub links: Vec<Link>,
    pub canonical: Option<Url>,
    pub images: Vec<Image>,
}

/// Parses markup and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Fragment-only links
/// - Anything that does not resolve to http(s)
///
/// # Example
///
/// ```
/// use harvester::encoder::parse_document;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.test/").unwrap();
/// let parsed = parse_document(html, &base_url);
/// assert_eq!(parsed.title.as_deref(), Some("Test"));
/// assert_eq!(parsed.links[0].href.as_str(), "https://example.test/page");
/// ```
pub fn parse_document(markup: &str, base_url: &Url) -> ParsedDocument {
    let document = Html::parse_document(markup);

    let headings = extract_headings(&document);
    let title = extract_title(&document).or_else(|| {
        headings
            .iter()
            .find(|h| h.level == 1)
            .map(|h| h.text.clone())
    });

    ParsedDocument {
        title,
        metadata: extract_metadata(&document),
        headings,
        links: extract_links(&document, base_url),
        canonical: extract_canonical(&document, base_url),
        images: extract_images(&document, base_url),
    }
}

impl ParsedDocument {
    /// URLs worth offering to the frontier: anchors then the canonical link
    pub fn crawl_links(&self) -> Vec<Url> {
        let mut urls: Vec<Url> = Vec::with_capacity(self.links.len() + 1);
        for url in self
            .links
            .iter()
            .map(|l| &l.href)
            .chain(self.canonical.as_ref())
        {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
        urls
    }
}

fn select<'a>(document: &'a Html, selector: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(selector) {
        Ok(sel) => document.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

/// Whitespace-collapsed text of an element
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn extract_title(document: &Html) -> Option<String> {
    select(document, "title")
        .first()
        .and_then(|element| non_empty(&element_text(element)))
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    select(document, selector)
        .iter()
        .find_map(|el| el.value().attr("content").and_then(non_empty))
}

fn extract_metadata(document: &Html) -> PageMetadata {
    let keywords = meta_content(document, "meta[name='keywords']")
        .map(|raw| {
            raw.split(',')
                .filter_map(non_empty)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    PageMetadata {
        description: meta_content(document, "meta[name='description']")
            .or_else(|| meta_content(document, "meta[property='og:description']")),
        keywords,
        author: meta_content(document, "meta[name='author']"),
        language: select(document, "html[lang]")
            .first()
            .and_then(|el| el.value().attr("lang").and_then(non_empty)),
    }
}

fn extract_headings(document: &Html) -> Vec<Heading> {
    select(document, "h1, h2, h3, h4, h5, h6")
        .iter()
        .filter_map(|el| {
            let level = el.value().name().strip_prefix('h')?.parse::<u8>().ok()?;
            let text = non_empty(&element_text(el))?;
            Some(Heading { level, text })
        })
        .collect()
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<Link> {
    select(document, "a[href]")
        .iter()
        .filter(|el| el.value().attr("download").is_none())
        .filter_map(|el| {
            let href = resolve_link(el.value().attr("href")?, base_url)?;
            Some(Link {
                text: element_text(el),
                href,
            })
        })
        .collect()
}

fn extract_canonical(document: &Html, base_url: &Url) -> Option<Url> {
    select(document, "link[rel='canonical'][href]")
        .iter()
        .find_map(|el| resolve_link(el.value().attr("href")?, base_url))
}

fn extract_images(document: &Html, base_url: &Url) -> Vec<Image> {
    select(document, "img[src]")
        .iter()
        .filter_map(|el| {
            let raw = el.value().attr("src")?.trim();
            if raw.is_empty() {
                return None;
            }
            let src = match base_url.join(raw) {
                Ok(url) => url.to_string(),
                Err(_) => raw.to_string(),
            };
            Some(Image {
                src,
                alt: el.value().attr("alt").unwrap_or_default().trim().to_string(),
            })
        })
        .collect()
}

/// Resolves an href to an absolute http(s) URL
///
/// Returns None for special schemes, data URIs, fragment-only links and
/// anything unparsable.
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    matches!(absolute.scheme(), "http" | "https").then_some(absolute)
}

//! Visible-text extraction

use scraper::{ElementRef, Html, Node};

/// Elements whose content is never visible
pub(crate) const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "br", "dd", "details", "div", "dl",
    "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table",
    "tbody", "thead", "tfoot", "tr", "ul",
];

/// Extracts the human-visible text of a document
///
/// Block elements start new lines, whitespace inside a line is collapsed to
/// single spaces and blank lines are dropped.
pub fn visible_text(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let mut buffer = String::new();
    collect_text(document.root_element(), &mut buffer);

    buffer
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(element: ElementRef<'_>, buffer: &mut String) {
    let name = element.value().name();
    if SKIPPED_ELEMENTS.contains(&name) {
        return;
    }

    let is_block = BLOCK_ELEMENTS.contains(&name);
    if is_block {
        buffer.push('\n');
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                // Source line breaks are not visible breaks
                buffer.extend(text.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c }));
            }
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, buffer);
                    if matches!(child_element.value().name(), "td" | "th") {
                        buffer.push(' ');
                    }
                }
            }
            _ => {}
        }
    }

    if is_block {
        buffer.push('\n');
    }
}

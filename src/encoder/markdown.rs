//! Link-preserving markdown conversion
//!
//! Walks the parsed DOM and emits one markdown block per block element.
//! Content with no markdown equivalent is kept in fenced blocks rather than
//! dropped:
//! - `pre` becomes a fenced code block, language taken from a
//!   `language-*` class
//! - `table` becomes a fenced block of pipe-delimited rows
//! - embedded media (`iframe`, `video`, `svg`, ...) becomes a fenced `html`
//!   block holding the element's markup

use crate::encoder::text::SKIPPED_ELEMENTS;
use scraper::{ElementRef, Html, Node};

const MEDIA_ELEMENTS: &[&str] = &["iframe", "video", "audio", "svg", "canvas", "object", "embed"];

const CONTAINER_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "body", "details", "dl", "dd", "dt", "div", "fieldset",
    "figcaption", "figure", "footer", "form", "header", "html", "main", "nav", "section",
    "summary",
];

fn longest_backtick_run(s: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in s.chars() {
        if c == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Returns a backtick fence longer than any backtick run in `body`
pub(crate) fn fence_for(body: &str) -> String {
    "`".repeat((longest_backtick_run(body) + 1).max(3))
}

/// Inline code delimited by one more backtick than the longest run inside
pub(crate) fn code_span(s: &str) -> String {
    match longest_backtick_run(s) {
        0 => format!("`{s}`"),
        longest => {
            let ticks = "`".repeat(longest + 1);
            format!("{ticks} {s} {ticks}")
        }
    }
}

/// Escapes characters that would end or nest a link label
fn escape_label(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Percent-encodes characters that would end a link destination early
fn escape_destination(href: &str) -> String {
    let mut out = String::with_capacity(href.len());
    for c in href.chars() {
        match c {
            ' ' => out.push_str("%20"),
            '(' => out.push_str("%28"),
            ')' => out.push_str("%29"),
            '<' => out.push_str("%3C"),
            '>' => out.push_str("%3E"),
            c if c.is_whitespace() => {}
            c => out.push(c),
        }
    }
    out
}

/// Wraps `body` in a fenced block with an optional info string
pub(crate) fn fenced(body: &str, info: &str) -> String {
    let fence = fence_for(body);
    format!("{fence}{info}\n{body}\n{fence}")
}

/// Converts markup to markdown
pub fn to_markdown(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let mut blocks = Vec::new();
    render_blocks(document.root_element(), &mut blocks);

    if blocks.is_empty() {
        String::new()
    } else {
        let mut out = blocks.join("\n\n");
        out.push('\n');
        out
    }
}

/// Accumulates inline content until the next block boundary
#[derive(Default)]
struct InlineBuffer {
    text: String,
    /// Media found inside inline content, emitted after the paragraph
    deferred: Vec<String>,
}

impl InlineBuffer {
    fn flush(&mut self, blocks: &mut Vec<String>) {
        let line = collapse(&self.text);
        if !line.is_empty() {
            blocks.push(line);
        }
        self.text.clear();
        blocks.append(&mut self.deferred);
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn render_blocks(element: ElementRef<'_>, blocks: &mut Vec<String>) {
    let mut inline = InlineBuffer::default();

    for child in element.children() {
        let child_element = match child.value() {
            Node::Text(text) => {
                inline.text.push_str(&text.text);
                continue;
            }
            Node::Element(_) => match ElementRef::wrap(child) {
                Some(el) => el,
                None => continue,
            },
            _ => continue,
        };

        let name = child_element.value().name();
        if SKIPPED_ELEMENTS.contains(&name) {
            continue;
        }

        if is_block(name) {
            inline.flush(blocks);
            render_block(child_element, blocks);
        } else {
            render_inline(child_element, &mut inline);
        }
    }

    inline.flush(blocks);
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "p" | "pre" | "table" | "ul" | "ol"
            | "blockquote" | "hr" | "br"
    ) || MEDIA_ELEMENTS.contains(&name)
        || CONTAINER_ELEMENTS.contains(&name)
}

fn render_block(element: ElementRef<'_>, blocks: &mut Vec<String>) {
    let name = element.value().name();
    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            let mut inline = InlineBuffer::default();
            render_inline_children(element, &mut inline);
            let text = collapse(&inline.text);
            if !text.is_empty() {
                blocks.push(format!("{} {}", "#".repeat(level), text));
            }
            blocks.append(&mut inline.deferred);
        }
        "p" => {
            let mut inline = InlineBuffer::default();
            render_inline_children(element, &mut inline);
            inline.flush(blocks);
        }
        "pre" => blocks.push(render_pre(element)),
        "table" => {
            if let Some(table) = render_table(element) {
                blocks.push(table);
            }
        }
        "ul" | "ol" => {
            let list = render_list(element, name == "ol");
            if !list.is_empty() {
                blocks.push(list);
            }
        }
        "blockquote" => {
            let mut inner = Vec::new();
            render_blocks(element, &mut inner);
            if !inner.is_empty() {
                let quoted = inner
                    .join("\n\n")
                    .lines()
                    .map(|line| {
                        if line.is_empty() {
                            ">".to_string()
                        } else {
                            format!("> {line}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                blocks.push(quoted);
            }
        }
        "hr" => blocks.push("---".to_string()),
        "br" => {}
        _ if MEDIA_ELEMENTS.contains(&name) => blocks.push(fenced(&element.html(), "html")),
        _ => render_blocks(element, blocks),
    }
}

fn render_inline_children(element: ElementRef<'_>, inline: &mut InlineBuffer) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => inline.text.push_str(&text.text),
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    render_inline(el, inline);
                }
            }
            _ => {}
        }
    }
}

/// Renders an element's content as a standalone inline string
fn inline_string(element: ElementRef<'_>, deferred: &mut Vec<String>) -> String {
    let mut inner = InlineBuffer::default();
    render_inline_children(element, &mut inner);
    deferred.append(&mut inner.deferred);
    collapse(&inner.text)
}

fn render_inline(element: ElementRef<'_>, inline: &mut InlineBuffer) {
    let name = element.value().name();
    if SKIPPED_ELEMENTS.contains(&name) {
        return;
    }
    if MEDIA_ELEMENTS.contains(&name) {
        inline.deferred.push(fenced(&element.html(), "html"));
        return;
    }

    match name {
        "a" => {
            let text = inline_string(element, &mut inline.deferred);
            match element.value().attr("href").map(str::trim) {
                Some(href) if !href.is_empty() => {
                    let label = if text.is_empty() { href } else { text.as_str() };
                    inline.text.push_str(&format!(
                        "[{}]({})",
                        escape_label(label),
                        escape_destination(href)
                    ));
                }
                _ => inline.text.push_str(&text),
            }
        }
        "img" => {
            if let Some(src) = element.value().attr("src").map(str::trim) {
                let alt = element.value().attr("alt").unwrap_or_default().trim();
                inline.text.push_str(&format!(
                    "![{}]({})",
                    escape_label(alt),
                    escape_destination(src)
                ));
            }
        }
        "strong" | "b" => wrap_inline(element, inline, "**"),
        "em" | "i" => wrap_inline(element, inline, "*"),
        "del" | "s" | "strike" => wrap_inline(element, inline, "~~"),
        "code" => {
            let code: String = element.text().collect();
            let code = collapse(&code);
            if !code.is_empty() {
                inline.text.push_str(&code_span(&code));
            }
        }
        "br" => inline.text.push(' '),
        _ => render_inline_children(element, inline),
    }
}

fn wrap_inline(element: ElementRef<'_>, inline: &mut InlineBuffer, marker: &str) {
    let text = inline_string(element, &mut inline.deferred);
    if !text.is_empty() {
        inline.text.push_str(&format!(" {marker}{text}{marker} "));
    }
}

fn code_language(element: &ElementRef<'_>) -> Option<String> {
    element.value().classes().find_map(|class| {
        class
            .strip_prefix("language-")
            .or_else(|| class.strip_prefix("lang-"))
            .map(str::to_string)
    })
}

fn render_pre(element: ElementRef<'_>) -> String {
    let language = code_language(&element).or_else(|| {
        element
            .children()
            .filter_map(ElementRef::wrap)
            .find(|child| child.value().name() == "code")
            .and_then(|code| code_language(&code))
    });

    let raw: String = element.text().collect();
    let body = raw.strip_prefix('\n').unwrap_or(&raw).trim_end();
    fenced(body, language.as_deref().unwrap_or_default())
}

fn render_table(element: ElementRef<'_>) -> Option<String> {
    let mut rows = Vec::new();
    let mut header_row = false;

    for row in element
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "tr")
    {
        let cells: Vec<ElementRef<'_>> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|cell| matches!(cell.value().name(), "td" | "th"))
            .collect();
        if cells.is_empty() {
            continue;
        }

        if rows.is_empty() {
            header_row = cells.iter().all(|cell| cell.value().name() == "th");
        }

        let rendered: Vec<String> = cells
            .iter()
            .map(|cell| {
                let text: String = cell.text().collect();
                collapse(&text).replace('|', "\\|")
            })
            .collect();
        let column_count = rendered.len();
        rows.push(format!("| {} |", rendered.join(" | ")));

        if header_row && rows.len() == 1 {
            rows.push(format!("|{}", " --- |".repeat(column_count)));
        }
    }

    if rows.is_empty() {
        None
    } else {
        Some(fenced(&rows.join("\n"), ""))
    }
}

fn render_list(element: ElementRef<'_>, ordered: bool) -> String {
    let mut lines = Vec::new();
    let mut index = 0;

    for item in element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "li")
    {
        index += 1;
        let marker = if ordered {
            format!("{index}. ")
        } else {
            "- ".to_string()
        };
        let indent = " ".repeat(marker.len());

        let mut inner = Vec::new();
        render_blocks(item, &mut inner);
        let body = inner.join("\n");

        let mut item_lines = body.lines();
        lines.push(format!("{marker}{}", item_lines.next().unwrap_or_default()));
        for line in item_lines {
            if line.is_empty() {
                lines.push(String::new());
            } else {
                lines.push(format!("{indent}{line}"));
            }
        }
    }

    lines.join("\n")
}

//! Plain-text export

use crate::output::{scalar, Record};
use serde_json::Value;

pub(crate) fn to_text(records: &[Record]) -> String {
    let mut text = String::from("SCRAPED DATA\n\n");

    for (index, record) in records.iter().enumerate() {
        text.push_str(&format!("ITEM {}\n", index + 1));
        text.push_str(&"=".repeat(20));
        text.push_str("\n\n");

        for (key, value) in record {
            match (key.as_str(), value) {
                ("content", Value::Object(formats)) => {
                    text.push_str("CONTENT:\n");
                    for (format, body) in formats {
                        text.push_str(&format!("  {}:\n", format));
                        for line in scalar(body).lines() {
                            text.push_str("    ");
                            text.push_str(line);
                            text.push('\n');
                        }
                        text.push('\n');
                    }
                }
                _ => text.push_str(&format!("{}: {}\n", key, scalar(value))),
            }
        }
        text.push('\n');
    }

    text
}

#[cfg(test)]
mod tests {
    use crate::output::{export, tests::sample, ExportFormat};

    #[test]
    fn test_item_blocks() {
        let text = String::from_utf8(export(&sample(), ExportFormat::Text).unwrap()).unwrap();

        assert!(text.starts_with("SCRAPED DATA\n\nITEM 1\n====================\n\n"));
        assert!(text.contains("url: https://example.test/a\n"));
        assert!(text.contains("CONTENT:\n  html:\n    <p>a</p>\n\n  text:\n    a\n"));
        assert!(text.contains("ITEM 2\n"));
        assert!(text.contains("error: HTTP 500\n"));
    }
}

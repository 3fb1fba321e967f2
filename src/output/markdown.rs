//! Markdown export
//!
//! One `## Item N` section per result. Page content gets a fenced block per
//! format, with a fence longer than any backtick run inside it.

use crate::encoder::{code_span, fenced};
use crate::output::{scalar, Record};
use serde_json::Value;

/// Formats records as a markdown document
pub(crate) fn to_markdown(records: &[Record]) -> String {
    let mut md = String::from("# Scraped Data\n\n");

    for (index, record) in records.iter().enumerate() {
        md.push_str(&format!("## Item {}\n\n", index + 1));

        for (key, value) in record {
            match (key.as_str(), value) {
                ("content", Value::Object(formats)) => {
                    md.push_str("### content\n\n");
                    for (format, body) in formats {
                        md.push_str(&format!("**{}:**\n\n", format));
                        md.push_str(&fenced(&scalar(body), format));
                        md.push_str("\n\n");
                    }
                }
                (_, Value::String(s)) => md.push_str(&format!("**{}:** {}\n\n", key, s)),
                _ => md.push_str(&format!("**{}:** {}\n\n", key, code_span(&value.to_string()))),
            }
        }

        md.push_str("---\n\n");
    }

    md
}

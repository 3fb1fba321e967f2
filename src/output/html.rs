//! HTML export: a self-contained page with one `div.item` per result

use crate::output::{scalar, Record};
use html_escape::encode_text;
use serde_json::Value;

const STYLE: &str = "body { font-family: sans-serif; margin: 20px; }
.item { border: 1px solid #ddd; margin: 10px 0; padding: 15px; border-radius: 5px; }
.key { font-weight: bold; color: #333; }
.value { margin-left: 10px; }
pre { background: #f5f5f5; padding: 10px; border-radius: 3px; overflow-x: auto; }";

/// Formats records as an HTML document; every value is escaped
pub(crate) fn to_html(records: &[Record]) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n");
    html.push_str("<title>Scraped Data</title>\n");
    html.push_str(&format!("<style>\n{}\n</style>\n", STYLE));
    html.push_str("</head>\n<body>\n<h1>Scraped Data</h1>\n");

    for (index, record) in records.iter().enumerate() {
        html.push_str(&format!("<div class=\"item\">\n<h2>Item {}</h2>\n", index + 1));

        for (key, value) in record {
            let key = encode_text(key);
            match value {
                Value::Object(formats) if key == "content" => {
                    html.push_str("<h3>content</h3>\n");
                    for (format, body) in formats {
                        html.push_str(&format!(
                            "<div><span class=\"key\">{}:</span><pre class=\"value\">{}</pre></div>\n",
                            encode_text(format),
                            encode_text(&scalar(body))
                        ));
                    }
                }
                _ => html.push_str(&format!(
                    "<div><span class=\"key\">{}:</span><span class=\"value\">{}</span></div>\n",
                    key,
                    encode_text(&scalar(value))
                )),
            }
        }

        html.push_str("</div>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use crate::config::ContentFormat;
    use crate::output::{export, tests::sample, ExportFormat};

    #[test]
    fn test_values_are_escaped() {
        let mut results = sample();
        results[0].title = Some("<script>alert(1)</script>".to_string());
        results[0]
            .content
            .insert(ContentFormat::Text, "a < b & c".to_string());

        let html = String::from_utf8(export(&results, ExportFormat::Html).unwrap()).unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("<pre class=\"value\">&lt;p&gt;a&lt;/p&gt;</pre>"));
        assert!(html.contains("a &lt; b &amp; c"));
        assert_eq!(html.matches("<div class=\"item\">").count(), 2);
        assert!(html.trim_end().ends_with("</html>"));
    }
}

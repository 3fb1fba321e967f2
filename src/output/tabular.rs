//! CSV export
//!
//! The header is the union of top-level keys across all results, in the
//! order they are first seen. Missing fields become empty cells.

use crate::output::{scalar, ExportError, ExportResult, Record};

pub(crate) fn to_csv(records: &[Record]) -> ExportResult<Vec<u8>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let mut header: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !header.contains(&key.as_str()) {
                header.push(key);
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;
    for record in records {
        writer.write_record(
            header
                .iter()
                .map(|key| record.get(*key).map(scalar).unwrap_or_default()),
        )?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Write(e.to_string()))
}

#[cfg(test)]
mod tests {
    use crate::output::{export, tests::sample, ExportFormat};

    fn csv_rows(body: &[u8]) -> Vec<Vec<String>> {
        csv::Reader::from_reader(body)
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_header_is_union_in_first_seen_order() {
        let body = export(&sample(), ExportFormat::Csv).unwrap();
        let header = String::from_utf8(body.clone())
            .unwrap()
            .lines()
            .next()
            .unwrap()
            .to_string();
        assert_eq!(
            header,
            "url,status,title,content,depth,durationMs,fetchedAt,error"
        );

        let rows = csv_rows(&body);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][2], "Alpha, first");
        assert_eq!(rows[0][7], "");
        assert_eq!(rows[1][2], "");
        assert_eq!(rows[1][7], "HTTP 500");
    }

    #[test]
    fn test_nested_values_are_json() {
        let body = export(&sample(), ExportFormat::Csv).unwrap();
        let rows = csv_rows(&body);
        let content: serde_json::Value = serde_json::from_str(&rows[0][3]).unwrap();
        assert_eq!(content["html"], "<p>a</p>");
        assert_eq!(rows[1][3], "");
    }
}

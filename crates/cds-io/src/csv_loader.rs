use std::collections::HashSet;
use std::path::Path;

use cds_core::config::TableLoaderSpec;
use cds_core::error::CdsError;
use cds_core::model::{Row, Table, SENTINEL};
use serde_json::Value;
use tracing::warn;

use crate::strategies::TableLoadStrategy;

/// The default table-load strategy: reads a CSV file, auto-detecting its encoding when the
/// table-loader spec does not pin one, and applies the standard loader post-conditions
/// (sentinel-fill missing cells, drop duplicate rows, fail empty loads).
pub struct CsvTableLoader;

impl TableLoadStrategy for CsvTableLoader {
    fn name(&self) -> &str {
        "default"
    }

    fn load(&self, table_name: &str, data_root: &Path, spec: &TableLoaderSpec) -> Result<Table, CdsError> {
        let path = data_root.join(&spec.file_name);
        let raw = std::fs::read(&path)
            .map_err(|e| CdsError::Other(anyhow::anyhow!("reading {:?}: {e}", path)))?;

        let text = match &spec.csv_options.encoding {
            Some(label) => {
                let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
                    .unwrap_or(encoding_rs::UTF_8);
                encoding.decode(&raw).0.into_owned()
            }
            None => detect_and_decode(&raw),
        };

        parse_csv_text(table_name, &text, spec.csv_options.delimiter)
    }
}

fn detect_and_decode(raw: &[u8]) -> String {
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(raw, true);
    let encoding = detector.guess(None, true);
    encoding.decode(raw).0.into_owned()
}

/// Parses already-decoded CSV text into a `Table`, applying the sentinel-fill, dedup, and
/// empty-load rules shared by every CSV-based strategy.
pub fn parse_csv_text(table_name: &str, text: &str, delimiter: char) -> Result<Table, CdsError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| CdsError::BadLine {
            table: table_name.to_string(),
            detail: e.to_string(),
        })?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    let mut seen = HashSet::new();

    for record in reader.records() {
        let record = record.map_err(|e| CdsError::BadLine {
            table: table_name.to_string(),
            detail: e.to_string(),
        })?;

        let mut row = Row::new();
        for (idx, column) in headers.iter().enumerate() {
            let raw_value = record.get(idx).unwrap_or("");
            let value = if raw_value.trim().is_empty() {
                Value::String(SENTINEL.to_string())
            } else {
                Value::String(raw_value.to_string())
            };
            row.insert(format!("{table_name}.{column}"), column.clone(), value);
        }

        let fingerprint = record.iter().collect::<Vec<_>>().join("\u{1f}");
        if !seen.insert(fingerprint) {
            warn!(table = table_name, "dropping duplicate row");
            continue;
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(CdsError::EmptyTable(table_name.to_string()));
    }

    Ok(Table {
        name: table_name.to_string(),
        columns: headers,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_missing_cells_with_sentinel() {
        let csv = "id,name\n1,\n2,Jane\n";
        let table = parse_csv_text("patients", csv, ',').unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get("name").unwrap(), SENTINEL);
        assert_eq!(table.rows[1].get("name").unwrap(), "Jane");
    }

    #[test]
    fn drops_duplicate_rows() {
        let csv = "id,name\n1,Jane\n1,Jane\n2,Tom\n";
        let table = parse_csv_text("patients", csv, ',').unwrap();
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn empty_table_is_an_error() {
        let csv = "id,name\n";
        let result = parse_csv_text("patients", csv, ',');
        assert!(matches!(result, Err(CdsError::EmptyTable(t)) if t == "patients"));
    }
}

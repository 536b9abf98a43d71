use std::path::Path;

use cds_core::config::TableLoaderSpec;
use cds_core::error::CdsError;
use cds_core::model::Table;

/// A pluggable way to turn one table's on-disk file into a loaded `Table`.
///
/// The default strategy (`"default"`, see [`crate::csv_loader::CsvTableLoader`]) handles the
/// common CSV case; custom strategies implement domain-specific post-filters or row recovery and
/// are selected by name from the table-loader document.
pub trait TableLoadStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn load(&self, table_name: &str, data_root: &Path, spec: &TableLoaderSpec) -> Result<Table, CdsError>;
}

/// Recovers a known malformed export where a trailing field contains an unescaped delimiter,
/// by re-joining any line that parses with more fields than the header and treating the
/// overflow as belonging to the last declared column.
///
/// Grounded in the original `LoadCaseList`/`join_bad_line` strategy, which special-cased a file
/// named `Pulladi_Fallliste.csv` the same way.
pub struct RecoverableCsvLoader;

impl TableLoadStrategy for RecoverableCsvLoader {
    fn name(&self) -> &str {
        "recoverable_csv"
    }

    fn load(&self, table_name: &str, data_root: &Path, spec: &TableLoaderSpec) -> Result<Table, CdsError> {
        let path = data_root.join(&spec.file_name);
        let raw = std::fs::read(&path)
            .map_err(|e| CdsError::Other(anyhow::anyhow!("reading {:?}: {e}", path)))?;
        let (text, _, _) = encoding_rs::UTF_8.decode(&raw);

        let mut lines = text.lines();
        let header_line = lines.next().ok_or_else(|| CdsError::BadLine {
            table: table_name.to_string(),
            detail: "empty file, no header".to_string(),
        })?;
        let delimiter = spec.csv_options.delimiter;
        let header: Vec<&str> = header_line.split(delimiter).collect();
        let expected = header.len();

        let mut joined_lines = vec![header_line.to_string()];
        for line in lines {
            let field_count = line.split(delimiter).count();
            if field_count <= expected {
                joined_lines.push(line.to_string());
                continue;
            }
            // More fields than the header declares: fold the overflow back into the last column
            // by re-joining the tail fields with the delimiter used inside the bad value.
            let fields: Vec<&str> = line.split(delimiter).collect();
            let (head, tail) = fields.split_at(expected - 1);
            let mut repaired = head.join(&delimiter.to_string());
            repaired.push(delimiter);
            repaired.push_str(&tail.join(" "));
            joined_lines.push(repaired);
        }

        let repaired_csv = joined_lines.join("\n");
        crate::csv_loader::parse_csv_text(table_name, &repaired_csv, delimiter)
    }
}

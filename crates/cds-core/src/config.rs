use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CdsError;
use crate::model::JoinSpec;

/// One entry of the mapping document: joins a set of tables and walks a template over each row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceMapping {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(rename = "usedTables")]
    pub used_tables: Vec<String>,
    #[serde(rename = "joinOn", default)]
    pub join_on: Vec<JoinSpec>,
    pub fields: Value,
}

/// The whole mapping document: an ordered list of resource mappings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingDocument {
    #[serde(rename = "resourceMappings")]
    pub resource_mappings: Vec<ResourceMapping>,
}

/// CSV dialect options merged over the default loader spec before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvOptions {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub has_headers: Option<bool>,
}

fn default_delimiter() -> char {
    ','
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            encoding: None,
            has_headers: None,
        }
    }
}

/// Per-table loader spec: which file to read, CSV dialect, and which strategy applies it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableLoaderSpec {
    pub file_name: String,
    #[serde(default)]
    pub csv_options: CsvOptions,
    #[serde(default = "default_strategy")]
    pub loader_strategy: String,
}

fn default_strategy() -> String {
    "default".to_string()
}

/// The table-loader document: `tableName -> spec`, merged over a default.
pub type TableLoaderDocument = HashMap<String, TableLoaderSpec>;

/// Loaded, validated mapping configuration for one pipeline A run.
#[derive(Debug, Clone)]
pub struct MappingConfig {
    document: MappingDocument,
    table_loaders: TableLoaderDocument,
}

impl MappingConfig {
    /// Loads the mapping document from `config_path` and the table-loader document from
    /// `table_loaders_path`. Fails with `CdsError::ConfigMissing` when the mapping document
    /// contains no resource mappings, mirroring the original's `sys.exit(1)` turned into a
    /// propagated error.
    pub fn load(config_path: &Path, table_loaders_path: &Path) -> Result<Self, CdsError> {
        let raw = fs::read_to_string(config_path)
            .map_err(|e| CdsError::Other(anyhow::anyhow!("reading {:?}: {e}", config_path)))?;
        let document: MappingDocument = serde_json::from_str(&raw)
            .map_err(|e| CdsError::Other(anyhow::anyhow!("parsing {:?}: {e}", config_path)))?;
        if document.resource_mappings.is_empty() {
            return Err(CdsError::ConfigMissing);
        }

        let loaders_raw = fs::read_to_string(table_loaders_path).map_err(|e| {
            CdsError::Other(anyhow::anyhow!("reading {:?}: {e}", table_loaders_path))
        })?;
        let table_loaders: TableLoaderDocument = serde_json::from_str(&loaders_raw)
            .map_err(|e| CdsError::Other(anyhow::anyhow!("parsing {:?}: {e}", table_loaders_path)))?;

        Ok(Self {
            document,
            table_loaders,
        })
    }

    pub fn mappings(&self) -> &[ResourceMapping] {
        &self.document.resource_mappings
    }

    pub fn table_loaders(&self) -> &TableLoaderDocument {
        &self.table_loaders
    }

    /// Harvests the set of processor names referenced as `"$name$"` leaves across every mapping
    /// template, for optional startup-time registry validation.
    pub fn processors(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        for mapping in &self.document.resource_mappings {
            harvest_processor_names(&mapping.fields, &mut names);
        }
        names
    }
}

fn harvest_processor_names(value: &Value, out: &mut HashSet<String>) {
    match value {
        Value::Array(items) => {
            if let Some(Value::String(first)) = items.first() {
                if let Some(name) = first.strip_prefix('$').and_then(|s| s.strip_suffix('$')) {
                    out.insert(name.to_string());
                }
            }
            for item in items {
                harvest_processor_names(item, out);
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                harvest_processor_names(v, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harvests_processor_names_from_nested_templates() {
        let fields = serde_json::json!({
            "id": "%pid%",
            "name": ["$process_name$", "%family%", "%given%"],
            "contact": { "phone": ["$format_phone$", "%phone%"] },
            "tags": ["a", "b"]
        });
        let mut names = HashSet::new();
        harvest_processor_names(&fields, &mut names);
        assert!(names.contains("process_name"));
        assert!(names.contains("format_phone"));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn empty_mapping_document_is_config_missing() {
        let document = MappingDocument {
            resource_mappings: vec![],
        };
        let cfg = MappingConfig {
            document,
            table_loaders: HashMap::new(),
        };
        assert!(cfg.mappings().is_empty());
    }
}

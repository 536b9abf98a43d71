use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cds_core::config::TableLoaderDocument;
use cds_core::error::CdsError;
use cds_core::model::Table;

use crate::csv_loader::CsvTableLoader;
use crate::strategies::{RecoverableCsvLoader, TableLoadStrategy};

/// Dispatches table names to their configured load strategy, always keeping the default CSV
/// strategy registered alongside whatever custom strategies the caller adds.
pub struct LoaderRegistry {
    data_root: PathBuf,
    strategies: HashMap<String, Box<dyn TableLoadStrategy>>,
}

impl LoaderRegistry {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        let mut strategies: HashMap<String, Box<dyn TableLoadStrategy>> = HashMap::new();
        let default = CsvTableLoader;
        strategies.insert(default.name().to_string(), Box::new(default));
        let recoverable = RecoverableCsvLoader;
        strategies.insert(recoverable.name().to_string(), Box::new(recoverable));
        Self {
            data_root: data_root.into(),
            strategies,
        }
    }

    pub fn register(&mut self, strategy: Box<dyn TableLoadStrategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Loads every table named in `used_tables`, looking up each one's spec in `table_loaders`.
    pub fn load_tables(
        &self,
        used_tables: &[String],
        table_loaders: &TableLoaderDocument,
    ) -> Result<HashMap<String, Table>, CdsError> {
        let mut loaded = HashMap::new();
        for table_name in used_tables {
            let spec = table_loaders
                .get(table_name)
                .ok_or_else(|| CdsError::UnknownTable(table_name.clone()))?;
            let strategy = self
                .strategies
                .get(spec.loader_strategy.as_str())
                .ok_or_else(|| CdsError::UnknownStrategy(spec.loader_strategy.clone()))?;
            let table = strategy.load(table_name, &self.data_root, spec)?;
            loaded.insert(table_name.clone(), table);
        }
        Ok(loaded)
    }
}

//! Declared cache layout.

use core_runtime::{SessionConfig, BLOB_DATABASE, BLOB_TABLE};
use std::collections::BTreeMap;

/// Logical database name to its required tables, in declaration order.
///
/// The `Blob` database with table `index` is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheIndex {
    databases: BTreeMap<String, Vec<String>>,
}

impl CacheIndex {
    pub fn new(databases: BTreeMap<String, Vec<String>>) -> Self {
        let mut index = Self {
            databases: BTreeMap::new(),
        };
        for (database, tables) in databases {
            for table in tables {
                index.declare(&database, &table);
            }
            index.databases.entry(database).or_default();
        }
        index.declare(BLOB_DATABASE, BLOB_TABLE);
        index
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.cache_index.clone())
    }

    fn declare(&mut self, database: &str, table: &str) {
        let tables = self.databases.entry(database.to_string()).or_default();
        if !tables.iter().any(|t| t == table) {
            tables.push(table.to_string());
        }
    }

    pub fn databases(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    /// Required tables of `database` in declaration order.
    pub fn tables(&self, database: &str) -> Option<&[String]> {
        self.databases.get(database).map(Vec::as_slice)
    }

    /// Required tables of `database`, sorted for comparison.
    pub fn sorted_tables(&self, database: &str) -> Vec<String> {
        let mut tables = self.tables(database).map(<[String]>::to_vec).unwrap_or_default();
        tables.sort();
        tables
    }

    pub fn len(&self) -> usize {
        self.databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

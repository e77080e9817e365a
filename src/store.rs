use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("Table not found: {0}")]
    MissingTable(String),

    #[error("Column not found: {0}")]
    MissingColumn(String),
}

/// One exported row. SQL NULLs are kept as `None`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct RawRow {
    columns: FxHashMap<String, Option<String>>,
}

impl RawRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).and_then(|v| v.as_deref())
    }

    pub fn require(&self, column: &str) -> Result<&str, StoreError> {
        self.get(column)
            .ok_or_else(|| StoreError::MissingColumn(column.to_string()))
    }

    pub fn owned(&self, column: &str) -> Option<String> {
        self.get(column).map(str::to_string)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTable {
    #[serde(default)]
    pub database: Option<String>,
    pub name: String,
    #[serde(default, rename = "data")]
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, rows: Vec<RawRow>) -> Self {
        Self {
            database: None,
            name: name.into(),
            rows,
        }
    }
}

/// Dump entries other than tables (export header, database marker) are skipped.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum DumpEntry {
    Table(RawTable),
    #[serde(other)]
    Other,
}

/// Immutable, name-keyed collection of the exported tables
#[derive(Debug, Default)]
pub struct TableStore {
    tables: FxHashMap<String, RawTable>,
}

impl TableStore {
    /// Loads a JSON table dump (an array of `{type, name, database, data}` entries).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Unable to open table dump: {}", path.display()))?;
        let entries: Vec<DumpEntry> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Unable to load data from: {}", path.display()))?;

        let tables: Vec<RawTable> = entries
            .into_iter()
            .filter_map(|entry| match entry {
                DumpEntry::Table(table) => Some(table),
                DumpEntry::Other => None,
            })
            .collect();

        Ok(Self::from_tables(tables))
    }

    /// Later tables replace earlier ones with the same name.
    pub fn from_tables(tables: Vec<RawTable>) -> Self {
        let mut map = FxHashMap::default();
        for table in tables {
            debug!(table = %table.name, rows = table.rows.len(), "Registering table");
            map.insert(table.name.clone(), table);
        }
        Self { tables: map }
    }

    pub fn table(&self, name: &str) -> Result<&RawTable, StoreError> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::MissingTable(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

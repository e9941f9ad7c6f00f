//! Dataset Store - the working table of every loaded file
//!
//! Datasets are keyed by file name and remembered in load order, which is
//! the order the combiner stacks or joins them in.

use serde::Serialize;
use std::collections::HashMap;

use crate::error::{TableError, TableResult};
use crate::history::EditHistory;
use crate::parser::{parse, ParsedTable, TableFormat};
use crate::table::Table;

/// How a dataset was decoded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub format: TableFormat,
    pub encoding: Option<String>,
    pub delimiter: Option<char>,
    pub sheet: Option<String>,
    /// Shape right after parsing
    pub original_rows: usize,
    pub original_columns: usize,
}

/// One loaded file with its current table and edit history
#[derive(Debug, Clone)]
pub struct Dataset {
    /// File name the dataset was loaded from
    pub id: String,
    /// Current working table
    pub table: Table,
    /// Dropped columns / rows
    pub history: EditHistory,
    /// Load timestamp
    pub loaded_at: String,
    pub source: SourceInfo,
}

/// Listing entry for [`DatasetStore::list`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub id: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub index_name: Option<String>,
    pub dropped_columns: usize,
    pub dropped_rows: usize,
    pub loaded_at: String,
    pub source: SourceInfo,
}

impl Dataset {
    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            id: self.id.clone(),
            rows: self.table.num_rows(),
            columns: self.table.column_names().into_iter().map(String::from).collect(),
            index_name: self.table.index_name().map(String::from),
            dropped_columns: self.history.dropped_columns().len(),
            dropped_rows: self.history.dropped_rows().len(),
            loaded_at: self.loaded_at.clone(),
            source: self.source.clone(),
        }
    }
}

/// Store for the datasets of one session
#[derive(Debug, Default)]
pub struct DatasetStore {
    /// Dataset ids in load order
    order: Vec<String>,
    /// Loaded datasets (id -> dataset)
    datasets: HashMap<String, Dataset>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current table for `id`, parsing `bytes` only on first access.
    ///
    /// An already-loaded id keeps its working table; the bytes are ignored.
    pub fn get_or_load(&mut self, id: &str, bytes: &[u8], format: TableFormat) -> TableResult<&Table> {
        if !self.datasets.contains_key(id) {
            let parsed = parse(bytes, format)?;
            self.insert(id, parsed, format);
        }
        self.get(id)
    }

    /// Add a freshly parsed dataset.
    pub fn insert(&mut self, id: &str, parsed: ParsedTable, format: TableFormat) {
        let source = SourceInfo {
            format,
            encoding: parsed.encoding,
            delimiter: parsed.delimiter,
            sheet: parsed.sheet,
            original_rows: parsed.table.num_rows(),
            original_columns: parsed.table.num_columns(),
        };
        let dataset = Dataset {
            id: id.to_string(),
            table: parsed.table,
            history: EditHistory::new(),
            loaded_at: chrono::Utc::now().to_rfc3339(),
            source,
        };
        if !self.order.iter().any(|o| o == id) {
            self.order.push(id.to_string());
        }
        self.datasets.insert(id.to_string(), dataset);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.datasets.contains_key(id)
    }

    /// Current table of a dataset
    pub fn get(&self, id: &str) -> TableResult<&Table> {
        self.dataset(id).map(|d| &d.table)
    }

    pub fn dataset(&self, id: &str) -> TableResult<&Dataset> {
        self.datasets
            .get(id)
            .ok_or_else(|| TableError::UnknownDataset(id.to_string()))
    }

    pub fn dataset_mut(&mut self, id: &str) -> TableResult<&mut Dataset> {
        self.datasets
            .get_mut(id)
            .ok_or_else(|| TableError::UnknownDataset(id.to_string()))
    }

    /// Summaries in load order
    pub fn list(&self) -> Vec<DatasetSummary> {
        self.order
            .iter()
            .filter_map(|id| self.datasets.get(id))
            .map(Dataset::summary)
            .collect()
    }

    /// `(id, table)` pairs in load order, as the combiner expects them
    pub fn tables_in_load_order(&self) -> Vec<(&str, &Table)> {
        self.order
            .iter()
            .filter_map(|id| self.datasets.get(id).map(|d| (id.as_str(), &d.table)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    #[test]
    fn test_get_or_load_parses_once() {
        let mut store = DatasetStore::new();
        let table = store
            .get_or_load("a.csv", b"x,y\n1,2\n3,4\n", TableFormat::Delimited)
            .unwrap();
        assert_eq!(table.num_rows(), 2);

        // Different bytes for the same id are ignored.
        let table = store
            .get_or_load("a.csv", b"z\n9\n", TableFormat::Delimited)
            .unwrap();
        assert_eq!(table.column_names(), vec!["x", "y"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_parse_failure_adds_nothing() {
        let mut store = DatasetStore::new();
        let err = store.get_or_load("empty.csv", b"", TableFormat::Delimited).unwrap_err();
        assert_eq!(err.kind(), "ParseError");
        assert!(store.is_empty());
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_set_and_unknown_dataset() {
        let mut store = DatasetStore::new();
        store.get_or_load("a.csv", b"x\n1\n", TableFormat::Delimited).unwrap();

        let replaced = Table::from_columns(vec![("x", vec![Cell::Int(5)])]).unwrap();
        store.dataset_mut("a.csv").unwrap().table = replaced.clone();
        assert_eq!(store.get("a.csv").unwrap(), &replaced);

        assert!(matches!(store.get("b.csv"), Err(TableError::UnknownDataset(id)) if id == "b.csv"));
        assert!(store.dataset_mut("b.csv").is_err());
    }

    #[test]
    fn test_load_order_is_kept() {
        let mut store = DatasetStore::new();
        for id in ["b.csv", "a.csv", "c.csv"] {
            store.get_or_load(id, b"x\n1\n", TableFormat::Delimited).unwrap();
        }
        let ids: Vec<&str> = store.tables_in_load_order().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec!["b.csv", "a.csv", "c.csv"]);

        let listed: Vec<String> = store.list().into_iter().map(|s| s.id).collect();
        assert_eq!(listed, vec!["b.csv", "a.csv", "c.csv"]);
    }
}

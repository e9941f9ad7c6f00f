//! Editing session: the query surface used by the CLI and the HTTP API.
//!
//! A [`Session`] owns the [`DatasetStore`] (and through it every dataset's
//! edit history) plus the last combined table. Each operation either commits
//! its result or returns an error with the dataset left untouched; other
//! datasets are never affected by a failure.

mod store;

pub use store::{Dataset, DatasetStore, DatasetSummary, SourceInfo};

use std::path::Path;

use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::combine::{combine, CombineMode};
use crate::error::{TableError, TableResult};
use crate::history::EditHistory;
use crate::parser::{parse_file, TableFormat};
use crate::table::{Cell, Table};
use crate::transform::{Script, Transform};

/// Name under which the combined table is reported in errors and logs.
pub const COMBINED_ID: &str = "<combined>";

/// Last combine result.
#[derive(Debug, Clone)]
pub struct Combined {
    pub mode: CombineMode,
    pub table: Table,
}

/// One user's editing session.
#[derive(Debug, Default)]
pub struct Session {
    store: DatasetStore,
    combined: Option<Combined>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Load uploaded bytes under `id`. A known id keeps its working table.
    pub fn load(&mut self, id: &str, bytes: &[u8], format: TableFormat) -> TableResult<&Table> {
        if self.store.contains(id) {
            log_info(format!("'{id}' is already loaded, keeping its working table"));
            return self.store.get(id);
        }
        log_info(format!("Reading '{id}' ({} bytes)...", bytes.len()));
        match self.store.get_or_load(id, bytes, format) {
            Ok(table) => {
                log_success(format!(
                    "Loaded '{id}': {} rows, {} columns",
                    table.num_rows(),
                    table.num_columns()
                ));
                Ok(table)
            }
            Err(e) => {
                log_error(format!("load failed on '{id}': {e}"));
                Err(e)
            }
        }
    }

    /// Load a file from disk; the dataset id is its file name.
    pub fn load_file(&mut self, path: &Path) -> TableResult<String> {
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        if self.store.contains(&id) {
            log_info(format!("'{id}' is already loaded, keeping its working table"));
            return Ok(id);
        }

        log_info(format!("Reading {}...", path.display()));
        let parsed = parse_file(path).map_err(|e| {
            log_error(format!("load failed on '{id}': {e}"));
            TableError::from(e)
        })?;
        if let Some(encoding) = &parsed.encoding {
            log_info_indent(format!("Encoding: {encoding}"), 1);
        }
        if let Some(delimiter) = parsed.delimiter {
            log_info_indent(format!("Separator: '{}'", format_delimiter(delimiter)), 1);
        }
        if let Some(sheet) = &parsed.sheet {
            log_info_indent(format!("Sheet: {sheet}"), 1);
        }
        log_success(format!(
            "Loaded '{id}': {} rows, {} columns",
            parsed.table.num_rows(),
            parsed.table.num_columns()
        ));

        let format = if parsed.sheet.is_some() {
            TableFormat::Spreadsheet
        } else {
            TableFormat::Delimited
        };
        self.store.insert(&id, parsed, format);
        Ok(id)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn list_datasets(&self) -> Vec<DatasetSummary> {
        self.store.list()
    }

    pub fn get_table(&self, id: &str) -> TableResult<&Table> {
        self.store.get(id)
    }

    pub fn history(&self, id: &str) -> TableResult<&EditHistory> {
        self.store.dataset(id).map(|d| &d.history)
    }

    /// Last combined table, if [`Session::combine`] has been called.
    pub fn combined(&self) -> Option<&Combined> {
        self.combined.as_ref()
    }

    // =========================================================================
    // Edits
    // =========================================================================

    pub fn apply_transform(&mut self, id: &str, transform: &Transform) -> TableResult<&Table> {
        self.edit(id, transform.name(), |table, _| transform.apply(table))
    }

    pub fn drop_columns(&mut self, id: &str, names: &[String]) -> TableResult<&Table> {
        self.edit(id, "drop_columns", |table, history| history.drop_columns(table, names))
    }

    pub fn restore_columns(&mut self, id: &str, names: &[String]) -> TableResult<&Table> {
        self.edit(id, "restore_columns", |table, history| {
            history.restore_columns(table, names)
        })
    }

    pub fn drop_rows(&mut self, id: &str, keys: &[Cell]) -> TableResult<&Table> {
        self.edit(id, "drop_rows", |table, history| history.drop_rows(table, keys))
    }

    pub fn restore_rows(&mut self, id: &str, keys: &[Cell]) -> TableResult<&Table> {
        self.edit(id, "restore_rows", |table, history| history.restore_rows(table, keys))
    }

    /// Run a script's steps on one dataset as a single operation.
    pub fn run_steps(&mut self, id: &str, script: &Script) -> TableResult<&Table> {
        self.edit(id, "script", |table, history| {
            script.run_steps(table, history).map_err(|(position, e)| {
                log_error(format!(
                    "step {} ({}) failed",
                    position + 1,
                    script.steps[position]
                ));
                e
            })
        })
    }

    /// Apply `op` to a dataset and commit the result only on success.
    fn edit<F>(&mut self, id: &str, operation: &str, op: F) -> TableResult<&Table>
    where
        F: FnOnce(&Table, &mut EditHistory) -> TableResult<Table>,
    {
        let dataset = match self.store.dataset_mut(id) {
            Ok(d) => d,
            Err(e) => {
                log_error(format!("{operation} failed: {e}"));
                return Err(e);
            }
        };
        match op(&dataset.table, &mut dataset.history) {
            Ok(table) => {
                dataset.table = table;
                log_success(format!(
                    "{operation} on '{id}': {} rows, {} columns",
                    dataset.table.num_rows(),
                    dataset.table.num_columns()
                ));
                Ok(&dataset.table)
            }
            Err(e) => {
                log_error(format!("{operation} failed on '{id}': {e}"));
                Err(e)
            }
        }
    }

    // =========================================================================
    // Combine
    // =========================================================================

    /// Combine every loaded dataset, in load order, and keep the result.
    pub fn combine(&mut self, mode: &CombineMode) -> TableResult<&Table> {
        self.combine_with(mode, &[])
    }

    /// Combine, then apply `transforms` to the result, as one operation.
    ///
    /// Everything runs on a local table; the stored combined table is only
    /// replaced once every transform has succeeded.
    pub fn combine_with(&mut self, mode: &CombineMode, transforms: &[Transform]) -> TableResult<&Table> {
        let tables = self.store.tables_in_load_order();
        if tables.is_empty() {
            log_warning("No datasets loaded, the combined table is empty");
        }
        log_info(format!("Combining {} dataset(s): {mode}", tables.len()));
        let mut table = combine(&tables, mode).map_err(|e| {
            log_error(format!("combine failed: {e}"));
            e
        })?;
        for (i, transform) in transforms.iter().enumerate() {
            table = transform.apply(&table).map_err(|e| {
                log_error(format!(
                    "combine aborted at step {} ({}): {e}",
                    i + 1,
                    transform.name()
                ));
                e
            })?;
            log_info_indent(format!("{transform}"), 1);
        }
        log_success(format!(
            "Combined table: {} rows, {} columns",
            table.num_rows(),
            table.num_columns()
        ));
        let combined = self.combined.insert(Combined {
            mode: mode.clone(),
            table,
        });
        Ok(&combined.table)
    }

    /// Apply a transform to the combined table.
    pub fn transform_combined(&mut self, transform: &Transform) -> TableResult<&Table> {
        let Some(combined) = self.combined.as_mut() else {
            let e = TableError::UnknownDataset(COMBINED_ID.to_string());
            log_error(format!("{} failed: nothing has been combined yet", transform.name()));
            return Err(e);
        };
        match transform.apply(&combined.table) {
            Ok(table) => {
                combined.table = table;
                log_success(format!("{transform} on combined table"));
                Ok(&combined.table)
            }
            Err(e) => {
                log_error(format!("{} failed on combined table: {e}", transform.name()));
                Err(e)
            }
        }
    }
}

/// Format delimiter for display
fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "TAB".to_string(),
        other => other.to_string(),
    }
}

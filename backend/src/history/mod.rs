//! Reversible column and row drops.
//!
//! Each dataset owns one [`EditHistory`]. Per axis it keeps the list of names
//! (or row keys) currently dropped and a single snapshot holding their data.
//!
//! The snapshot is single-slot: every new drop on an axis replaces it. Names
//! dropped earlier that are not part of the new snapshot can no longer be
//! restored; they move from the dropped list to the lost list so that every
//! name in the dropped list is always retrievable from the snapshot.
//!
//! All methods validate before touching any state, so an `Err` leaves the
//! history exactly as it was.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::api::logs::log_warning;
use crate::error::{TableError, TableResult};
use crate::table::{Cell, Column, Table};

/// Drop/restore bookkeeping for one dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditHistory {
    dropped_columns: Vec<String>,
    dropped_columns_snapshot: Table,
    lost_columns: Vec<String>,
    dropped_rows: Vec<Cell>,
    dropped_rows_snapshot: Table,
    lost_rows: Vec<Cell>,
}

/// Serializable view of an [`EditHistory`] without the snapshot data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub dropped_columns: Vec<String>,
    pub dropped_rows: Vec<Cell>,
    pub lost_columns: Vec<String>,
    pub lost_rows: Vec<Cell>,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column names that can currently be restored, in drop order.
    pub fn dropped_columns(&self) -> &[String] {
        &self.dropped_columns
    }

    /// Row keys that can currently be restored, in drop order.
    pub fn dropped_rows(&self) -> &[Cell] {
        &self.dropped_rows
    }

    /// Columns whose data was overwritten by a later column drop.
    pub fn lost_columns(&self) -> &[String] {
        &self.lost_columns
    }

    /// Rows whose data was overwritten by a later row drop.
    pub fn lost_rows(&self) -> &[Cell] {
        &self.lost_rows
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            dropped_columns: self.dropped_columns.clone(),
            dropped_rows: self.dropped_rows.clone(),
            lost_columns: self.lost_columns.clone(),
            lost_rows: self.lost_rows.clone(),
        }
    }

    // =========================================================================
    // Columns
    // =========================================================================

    /// Remove `names` from `table`, snapshotting their current values.
    ///
    /// Names already dropped are ignored. When nothing is left to drop the
    /// call is a no-op and the snapshot is kept.
    pub fn drop_columns(&mut self, table: &Table, names: &[String]) -> TableResult<Table> {
        let mut narrowed: Vec<String> = Vec::new();
        for name in names {
            if !self.dropped_columns.contains(name) && !narrowed.contains(name) {
                narrowed.push(name.clone());
            }
        }
        if narrowed.is_empty() {
            return Ok(table.clone());
        }

        let snapshot = table.select_columns(&narrowed)?;
        let remaining = table.without_columns(&narrowed);

        if !self.dropped_columns.is_empty() {
            log_warning(format!(
                "Column snapshot overwritten, no longer restorable: {}",
                self.dropped_columns.join(", ")
            ));
            self.lost_columns.append(&mut self.dropped_columns);
        }
        self.lost_columns.retain(|n| !narrowed.contains(n));
        self.dropped_columns = narrowed;
        self.dropped_columns_snapshot = snapshot;
        Ok(remaining)
    }

    /// Put `names` back from the snapshot, appended after the current columns.
    ///
    /// Values are aligned by row key: a row of `table` that is not in the
    /// snapshot gets a missing cell.
    pub fn restore_columns(&mut self, table: &Table, names: &[String]) -> TableResult<Table> {
        if self.dropped_columns_snapshot.num_columns() == 0 {
            return Err(TableError::NothingToRestore("no dropped columns".to_string()));
        }
        if names.is_empty() {
            return Err(TableError::NothingToRestore("no columns requested".to_string()));
        }

        let mut requested: Vec<&String> = Vec::new();
        for name in names {
            if requested.contains(&name) {
                continue;
            }
            if !self.dropped_columns.contains(name) || !self.dropped_columns_snapshot.has_column(name) {
                let reason = if self.lost_columns.contains(name) {
                    "its data was overwritten by a later drop"
                } else {
                    "it is not in the dropped list"
                };
                return Err(TableError::NothingToRestore(format!(
                    "column '{name}' cannot be restored: {reason}"
                )));
            }
            if table.has_column(name) {
                return Err(TableError::DuplicateName(name.clone()));
            }
            requested.push(name);
        }

        let snapshot = &self.dropped_columns_snapshot;
        let positions: HashMap<&Cell, usize> =
            snapshot.index().iter().enumerate().map(|(p, k)| (k, p)).collect();

        let mut restored = table.clone();
        for name in &requested {
            let source = snapshot.require_column(name)?;
            let values = table
                .index()
                .iter()
                .map(|key| {
                    positions
                        .get(key)
                        .map(|&p| source.values[p].clone())
                        .unwrap_or_default()
                })
                .collect();
            restored.put_column(Column::new(name.as_str(), values));
        }

        let requested: Vec<String> = requested.into_iter().cloned().collect();
        self.dropped_columns.retain(|n| !requested.contains(n));
        self.dropped_columns_snapshot = self.dropped_columns_snapshot.without_columns(&requested);
        Ok(restored)
    }

    // =========================================================================
    // Rows
    // =========================================================================

    /// Remove the rows at `keys` from `table`, snapshotting them whole.
    pub fn drop_rows(&mut self, table: &Table, keys: &[Cell]) -> TableResult<Table> {
        let mut positions: Vec<usize> = Vec::new();
        for key in keys {
            if self.dropped_rows.iter().any(|d| key_matches(d, key)) {
                continue;
            }
            let pos = table
                .find_row(key)
                .ok_or_else(|| TableError::RowNotFound(key.to_string()))?;
            if !positions.contains(&pos) {
                positions.push(pos);
            }
        }
        if positions.is_empty() {
            return Ok(table.clone());
        }

        let dropped: HashSet<usize> = positions.iter().copied().collect();
        let kept: Vec<usize> = (0..table.num_rows()).filter(|p| !dropped.contains(p)).collect();
        let snapshot = table.take_rows(&positions);
        let remaining = table.take_rows(&kept);
        let new_keys: Vec<Cell> = snapshot.index().to_vec();

        if !self.dropped_rows.is_empty() {
            let shown: Vec<String> = self.dropped_rows.iter().map(|k| k.to_string()).collect();
            log_warning(format!(
                "Row snapshot overwritten, no longer restorable: {}",
                shown.join(", ")
            ));
            self.lost_rows.append(&mut self.dropped_rows);
        }
        self.lost_rows.retain(|k| !new_keys.contains(k));
        self.dropped_rows = new_keys;
        self.dropped_rows_snapshot = snapshot;
        Ok(remaining)
    }

    /// Put the rows at `keys` back and re-sort the table by row key.
    ///
    /// Restored rows are aligned to the current columns; a column the
    /// snapshot does not have is missing for them.
    pub fn restore_rows(&mut self, table: &Table, keys: &[Cell]) -> TableResult<Table> {
        if self.dropped_rows_snapshot.num_rows() == 0 {
            return Err(TableError::NothingToRestore("no dropped rows".to_string()));
        }
        if keys.is_empty() {
            return Err(TableError::NothingToRestore("no rows requested".to_string()));
        }

        let snapshot = &self.dropped_rows_snapshot;
        let mut positions: Vec<usize> = Vec::new();
        for key in keys {
            let listed = self.dropped_rows.iter().any(|d| key_matches(d, key));
            let pos = snapshot.find_row(key).filter(|_| listed).ok_or_else(|| {
                TableError::NothingToRestore(format!("row {key} is not restorable"))
            })?;
            let stored = &snapshot.index()[pos];
            if table.index().contains(stored) {
                return Err(TableError::DuplicateIndex {
                    column: table.index_name().unwrap_or("index").to_string(),
                    key: stored.to_string(),
                });
            }
            if !positions.contains(&pos) {
                positions.push(pos);
            }
        }

        let columns = table
            .columns()
            .iter()
            .map(|c| {
                let mut values = c.values.clone();
                let source = snapshot.column(&c.name);
                values.extend(positions.iter().map(|&p| {
                    source.map(|s| s.values[p].clone()).unwrap_or_default()
                }));
                Column::new(c.name.clone(), values)
            })
            .collect();
        let mut index = table.index().to_vec();
        index.extend(positions.iter().map(|&p| snapshot.index()[p].clone()));

        let mut order: Vec<usize> = (0..index.len()).collect();
        order.sort_by(|&a, &b| index[a].cmp(&index[b]));
        let restored = Table::from_parts(columns, index, table.index_name().map(String::from))
            .take_rows(&order);

        let restored_keys: Vec<Cell> = positions.iter().map(|&p| snapshot.index()[p].clone()).collect();
        let kept: Vec<usize> = (0..snapshot.num_rows()).filter(|p| !positions.contains(p)).collect();
        self.dropped_rows_snapshot = snapshot.take_rows(&kept);
        self.dropped_rows.retain(|k| !restored_keys.contains(k));
        Ok(restored)
    }
}

/// A requested key addresses a stored key by equality or by display text.
fn key_matches(stored: &Cell, requested: &Cell) -> bool {
    stored == requested || requested.as_str().is_some_and(|s| s == stored.to_string())
}

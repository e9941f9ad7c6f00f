//! Combine several datasets into one working table.
//!
//! Two exclusive modes:
//! - `concatenate`: stack rows in load order over the union of columns
//! - `merge`: inner join on one shared key column, chained left to right
//!
//! The result always carries a fresh 0-based index.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{TableError, TableResult};
use crate::table::{positional_index, Cell, Column, Table};

/// How to combine the loaded datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CombineMode {
    Concatenate,
    Merge { key: String },
}

impl fmt::Display for CombineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombineMode::Concatenate => write!(f, "concatenate"),
            CombineMode::Merge { key } => write!(f, "merge on '{key}'"),
        }
    }
}

/// Combine `(dataset id, table)` pairs, in the order given.
pub fn combine(tables: &[(&str, &Table)], mode: &CombineMode) -> TableResult<Table> {
    match mode {
        CombineMode::Concatenate => Ok(concatenate(tables.iter().map(|(_, t)| *t))),
        CombineMode::Merge { key } => merge(tables, key),
    }
}

/// Stack rows; a column absent from a table is missing for that table's rows.
pub fn concatenate<'a>(tables: impl IntoIterator<Item = &'a Table>) -> Table {
    let tables: Vec<&Table> = tables.into_iter().collect();

    let mut names: Vec<&str> = Vec::new();
    for table in &tables {
        for name in table.column_names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }

    let rows: usize = tables.iter().map(|t| t.num_rows()).sum();
    let columns = names
        .iter()
        .map(|&name| {
            let mut values = Vec::with_capacity(rows);
            for table in &tables {
                match table.column(name) {
                    Some(c) => values.extend(c.values.iter().cloned()),
                    None => values.resize(values.len() + table.num_rows(), Cell::Missing),
                }
            }
            Column::new(name, values)
        })
        .collect();

    Table::from_parts(columns, positional_index(rows), None)
}

/// Inner join every table on `key`, left to right.
///
/// The key must exist in every table before any joining is done. Missing
/// keys never match; no matches at all is an empty table, not an error.
pub fn merge(tables: &[(&str, &Table)], key: &str) -> TableResult<Table> {
    if let Some((dataset, _)) = tables.iter().find(|(_, t)| !t.has_column(key)) {
        return Err(TableError::MergeKey {
            key: key.to_string(),
            dataset: dataset.to_string(),
        });
    }

    let mut iter = tables.iter();
    let Some((_, first)) = iter.next() else {
        return Ok(Table::new());
    };
    let mut merged = (*first).clone();
    merged.reset_index();
    for (_, right) in iter {
        merged = inner_join(&merged, right, key)?;
    }
    Ok(merged)
}

fn inner_join(left: &Table, right: &Table, key: &str) -> TableResult<Table> {
    let left_keys = &left.require_column(key)?.values;
    let right_keys = &right.require_column(key)?.values;

    let mut lookup: HashMap<&Cell, Vec<usize>> = HashMap::new();
    for (pos, k) in right_keys.iter().enumerate() {
        if !k.is_missing() {
            lookup.entry(k).or_default().push(pos);
        }
    }

    let pairs: Vec<(usize, usize)> = left_keys
        .iter()
        .enumerate()
        .filter(|(_, k)| !k.is_missing())
        .flat_map(|(l, k)| {
            lookup
                .get(k)
                .into_iter()
                .flatten()
                .map(move |&r| (l, r))
        })
        .collect();

    let shared: HashSet<&str> = left
        .column_names()
        .into_iter()
        .filter(|n| *n != key && right.has_column(n))
        .collect();

    let mut taken: HashSet<String> = HashSet::new();
    let mut columns = Vec::with_capacity(left.num_columns() + right.num_columns());
    for column in left.columns() {
        let name = if shared.contains(column.name.as_str()) {
            suffixed(&column.name, "_x", &taken)
        } else {
            column.name.clone()
        };
        taken.insert(name.clone());
        columns.push(Column::new(name, pairs.iter().map(|&(l, _)| column.values[l].clone()).collect()));
    }
    for column in right.columns().iter().filter(|c| c.name != key) {
        let name = if shared.contains(column.name.as_str()) || taken.contains(&column.name) {
            suffixed(&column.name, "_y", &taken)
        } else {
            column.name.clone()
        };
        taken.insert(name.clone());
        columns.push(Column::new(name, pairs.iter().map(|&(_, r)| column.values[r].clone()).collect()));
    }

    Ok(Table::from_parts(columns, positional_index(pairs.len()), None))
}

fn suffixed(name: &str, suffix: &str, taken: &HashSet<String>) -> String {
    let mut candidate = format!("{name}{suffix}");
    while taken.contains(&candidate) {
        candidate.push_str(suffix);
    }
    candidate
}

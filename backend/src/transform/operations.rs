//! Table transforms.
//!
//! Every transform reads one table and builds a new one. None of them consult
//! the edit history; column and row drops are handled by [`crate::history`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use super::aggregate::{group_aggregate, Aggregate};
use super::convert::convert_column;
use super::formula::apply_formula;
use crate::error::{TableError, TableResult};
use crate::table::{Cell, CellType, Column, Table};

/// All available table transforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    /// Remove rows identical to an earlier row
    Deduplicate,

    /// Cast one column to another type
    Convert { column: String, to: CellType },

    /// Stable sort by one column
    Sort {
        column: String,
        #[serde(default = "default_ascending")]
        ascending: bool,
    },

    /// Group by one column and aggregate all others
    GroupAggregate { column: String, func: Aggregate },

    /// Use a column's values as the row index
    SetIndex { column: String },

    /// Remove every row with at least one missing cell
    DropMissing,

    /// Replace every missing cell with a literal
    FillMissing { value: String },

    /// Rename one column
    Rename { from: String, to: String },

    /// Keep rows whose column text contains a substring
    Filter { column: String, contains: String },

    /// Add or overwrite a column from `name = expression`
    Formula { formula: String },
}

fn default_ascending() -> bool {
    true
}

impl Transform {
    /// Short operation name, as used in logs and error responses.
    pub fn name(&self) -> &'static str {
        match self {
            Transform::Deduplicate => "deduplicate",
            Transform::Convert { .. } => "convert",
            Transform::Sort { .. } => "sort",
            Transform::GroupAggregate { .. } => "group_aggregate",
            Transform::SetIndex { .. } => "set_index",
            Transform::DropMissing => "drop_missing",
            Transform::FillMissing { .. } => "fill_missing",
            Transform::Rename { .. } => "rename",
            Transform::Filter { .. } => "filter",
            Transform::Formula { .. } => "formula",
        }
    }

    /// Apply this transform, producing a new table.
    pub fn apply(&self, table: &Table) -> TableResult<Table> {
        match self {
            Transform::Deduplicate => Ok(deduplicate(table)),
            Transform::Convert { column, to } => convert_column(table, column, *to),
            Transform::Sort { column, ascending } => sort(table, column, *ascending),
            Transform::GroupAggregate { column, func } => group_aggregate(table, column, *func),
            Transform::SetIndex { column } => set_index(table, column),
            Transform::DropMissing => Ok(drop_missing(table)),
            Transform::FillMissing { value } => Ok(fill_missing(table, value)),
            Transform::Rename { from, to } => rename(table, from, to),
            Transform::Filter { column, contains } => filter(table, column, contains),
            Transform::Formula { formula } => {
                apply_formula(table, formula).map_err(TableError::from)
            }
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Deduplicate => write!(f, "deduplicate"),
            Transform::Convert { column, to } => write!(f, "convert '{column}' to {to}"),
            Transform::Sort { column, ascending } => write!(
                f,
                "sort by '{column}' {}",
                if *ascending { "ascending" } else { "descending" }
            ),
            Transform::GroupAggregate { column, func } => {
                write!(f, "group by '{column}' with {func}")
            }
            Transform::SetIndex { column } => write!(f, "set index to '{column}'"),
            Transform::DropMissing => write!(f, "drop rows with missing values"),
            Transform::FillMissing { value } => write!(f, "fill missing values with '{value}'"),
            Transform::Rename { from, to } => write!(f, "rename '{from}' to '{to}'"),
            Transform::Filter { column, contains } => {
                write!(f, "keep rows where '{column}' contains '{contains}'")
            }
            Transform::Formula { formula } => write!(f, "formula {formula}"),
        }
    }
}

// =============================================================================
// Implementations
// =============================================================================

/// Keep the first occurrence of each distinct row; the index is not compared.
pub fn deduplicate(table: &Table) -> Table {
    let mut seen: HashSet<Vec<&Cell>> = HashSet::with_capacity(table.num_rows());
    let keep: Vec<usize> = table
        .rows()
        .enumerate()
        .filter_map(|(pos, row)| seen.insert(row).then_some(pos))
        .collect();
    table.take_rows(&keep)
}

/// Stable sort on one column; missing cells go last either way.
pub fn sort(table: &Table, column: &str, ascending: bool) -> TableResult<Table> {
    let values = &table.require_column(column)?.values;
    let mut order: Vec<usize> = (0..table.num_rows()).collect();
    order.sort_by(|&a, &b| {
        let (x, y) = (&values[a], &values[b]);
        match (x.is_missing(), y.is_missing()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ if ascending => x.cmp(y),
            _ => y.cmp(x),
        }
    });
    Ok(table.take_rows(&order))
}

/// Move a column into the row index. Repeated keys are rejected.
pub fn set_index(table: &Table, column: &str) -> TableResult<Table> {
    let keys = table.require_column(column)?.values.clone();
    let mut seen = HashSet::with_capacity(keys.len());
    if let Some(dup) = keys.iter().find(|k| !seen.insert(*k)) {
        return Err(TableError::DuplicateIndex {
            column: column.to_string(),
            key: dup.to_string(),
        });
    }

    let (columns, _, _) = table.clone().into_parts();
    let columns = columns.into_iter().filter(|c| c.name != column).collect();
    Ok(Table::from_parts(columns, keys, Some(column.to_string())))
}

pub fn drop_missing(table: &Table) -> Table {
    let keep: Vec<usize> = table
        .rows()
        .enumerate()
        .filter(|(_, row)| !row.iter().any(|c| c.is_missing()))
        .map(|(pos, _)| pos)
        .collect();
    table.take_rows(&keep)
}

pub fn fill_missing(table: &Table, value: &str) -> Table {
    let (columns, index, index_name) = table.clone().into_parts();
    let columns = columns
        .into_iter()
        .map(|c| {
            let values = c
                .values
                .into_iter()
                .map(|cell| {
                    if cell.is_missing() {
                        Cell::Text(value.to_string())
                    } else {
                        cell
                    }
                })
                .collect();
            Column::new(c.name, values)
        })
        .collect();
    Table::from_parts(columns, index, index_name)
}

pub fn rename(table: &Table, from: &str, to: &str) -> TableResult<Table> {
    table.require_column(from)?;
    if from == to {
        return Ok(table.clone());
    }
    if table.has_column(to) {
        return Err(TableError::DuplicateName(to.to_string()));
    }
    let (mut columns, index, index_name) = table.clone().into_parts();
    for column in columns.iter_mut().filter(|c| c.name == from) {
        column.name = to.to_string();
    }
    Ok(Table::from_parts(columns, index, index_name))
}

/// Case-sensitive literal substring match on the cell's text form.
pub fn filter(table: &Table, column: &str, contains: &str) -> TableResult<Table> {
    let values = &table.require_column(column)?.values;
    let keep: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, cell)| cell.to_string().contains(contains))
        .map(|(pos, _)| pos)
        .collect();
    Ok(table.take_rows(&keep))
}

/// Get a description of all available transforms
pub fn transforms_description() -> String {
    r#"Available transforms:

| Transform | Description | Parameters |
|-----------|-------------|------------|
| deduplicate | Remove rows equal to an earlier row | - |
| convert | Cast a column | column, to: integer/float/text/timestamp/boolean |
| sort | Stable sort by a column (missing last) | column, ascending (default true) |
| group_aggregate | Group by a column, aggregate the rest | column, func: sum/mean/count/min/max |
| set_index | Use a column as the row index (keys must be unique) | column |
| drop_missing | Remove rows with any missing cell | - |
| fill_missing | Replace missing cells with a text literal | value |
| rename | Rename a column | from, to |
| filter | Keep rows whose text contains a substring | column, contains |
| formula | Add/overwrite a column: name = expression (+ - * / parentheses) | formula |

Example transforms in JSON:
[
  {"type": "deduplicate"},
  {"type": "convert", "column": "price", "to": "float"},
  {"type": "sort", "column": "price", "ascending": false},
  {"type": "formula", "formula": "total = price * quantity"},
  {"type": "group_aggregate", "column": "region", "func": "sum"}
]"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(columns: Vec<(&str, Vec<Cell>)>) -> Table {
        Table::from_columns(columns).unwrap()
    }

    fn ints(values: &[i64]) -> Vec<Cell> {
        values.iter().map(|&v| Cell::Int(v)).collect()
    }

    #[test]
    fn test_deserialize_transforms() {
        let t: Transform = serde_json::from_value(json!({"type": "sort", "column": "a"})).unwrap();
        assert_eq!(t, Transform::Sort { column: "a".into(), ascending: true });

        let t: Transform =
            serde_json::from_value(json!({"type": "convert", "column": "a", "to": "int"})).unwrap();
        assert_eq!(t, Transform::Convert { column: "a".into(), to: CellType::Integer });

        let t: Transform = serde_json::from_value(
            json!({"type": "group_aggregate", "column": "k", "func": "mean"}),
        )
        .unwrap();
        assert_eq!(t.name(), "group_aggregate");
    }

    #[test]
    fn test_deduplicate_keeps_first_and_is_idempotent() {
        let t = table(vec![
            ("a", ints(&[1, 2, 1, 3, 2])),
            ("b", vec![Cell::from("x"), Cell::from("y"), Cell::from("x"), Cell::from("z"), Cell::from("q")]),
        ]);
        let once = Transform::Deduplicate.apply(&t).unwrap();
        assert_eq!(once.index(), &ints(&[0, 1, 3, 4])[..]);
        let twice = Transform::Deduplicate.apply(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_sort_is_stable() {
        let t = table(vec![
            ("k", ints(&[2, 1, 2, 1])),
            ("tag", vec![Cell::from("a"), Cell::from("b"), Cell::from("c"), Cell::from("d")]),
        ]);
        let asc = sort(&t, "k", true).unwrap();
        assert_eq!(
            asc.column("tag").unwrap().values,
            vec![Cell::from("b"), Cell::from("d"), Cell::from("a"), Cell::from("c")]
        );
        let desc = sort(&t, "k", false).unwrap();
        assert_eq!(
            desc.column("tag").unwrap().values,
            vec![Cell::from("a"), Cell::from("c"), Cell::from("b"), Cell::from("d")]
        );
        // Keys travel with their rows.
        assert_eq!(asc.index(), &ints(&[1, 3, 0, 2])[..]);
    }

    #[test]
    fn test_sort_missing_last() {
        let t = table(vec![("k", vec![Cell::Missing, Cell::Int(2), Cell::Int(1)])]);
        let asc = sort(&t, "k", true).unwrap();
        assert_eq!(asc.column("k").unwrap().values, vec![Cell::Int(1), Cell::Int(2), Cell::Missing]);
        let desc = sort(&t, "k", false).unwrap();
        assert_eq!(desc.column("k").unwrap().values, vec![Cell::Int(2), Cell::Int(1), Cell::Missing]);
    }

    #[test]
    fn test_set_index() {
        let t = table(vec![
            ("code", vec![Cell::from("a"), Cell::from("b")]),
            ("v", ints(&[1, 2])),
        ]);
        let indexed = set_index(&t, "code").unwrap();
        assert_eq!(indexed.column_names(), vec!["v"]);
        assert_eq!(indexed.index(), &[Cell::from("a"), Cell::from("b")]);
        assert_eq!(indexed.index_name(), Some("code"));
    }

    #[test]
    fn test_set_index_rejects_duplicates() {
        let t = table(vec![("code", vec![Cell::from("a"), Cell::from("a")])]);
        let err = set_index(&t, "code").unwrap_err();
        assert!(matches!(err, TableError::DuplicateIndex { ref key, .. } if key == "a"));
        assert_eq!(err.kind(), "DuplicateIndexError");
    }

    #[test]
    fn test_fill_and_drop_missing() {
        let t = table(vec![
            ("a", vec![Cell::Int(1), Cell::Missing, Cell::Int(3)]),
            ("b", vec![Cell::from("x"), Cell::from("y"), Cell::Missing]),
        ]);
        let dropped = drop_missing(&t);
        assert_eq!(dropped.num_rows(), 1);
        assert_eq!(dropped.index(), &[Cell::Int(0)]);

        let filled = fill_missing(&t, "n/a");
        assert_eq!(filled.column("a").unwrap().values[1], Cell::from("n/a"));
        assert_eq!(filled.column("b").unwrap().values[2], Cell::from("n/a"));
    }

    #[test]
    fn test_rename() {
        let t = table(vec![("a", ints(&[1])), ("b", ints(&[2]))]);
        let renamed = rename(&t, "a", "c").unwrap();
        assert_eq!(renamed.column_names(), vec!["c", "b"]);

        assert!(matches!(rename(&t, "a", "b"), Err(TableError::DuplicateName(n)) if n == "b"));
        assert!(matches!(rename(&t, "z", "y"), Err(TableError::ColumnNotFound(_))));
    }

    #[test]
    fn test_filter_is_literal_and_case_sensitive() {
        let t = table(vec![(
            "name",
            vec![Cell::from("Apple"), Cell::from("apple pie"), Cell::from("a.c"), Cell::Missing],
        )]);
        let out = filter(&t, "name", "apple").unwrap();
        assert_eq!(out.column("name").unwrap().values, vec![Cell::from("apple pie")]);

        let out = filter(&t, "name", ".").unwrap();
        assert_eq!(out.column("name").unwrap().values, vec![Cell::from("a.c")]);
    }

    #[test]
    fn test_filter_matches_boolean_text() {
        let t = table(vec![
            ("ok", vec![Cell::Bool(true), Cell::Bool(false), Cell::Missing]),
            ("n", ints(&[1, 2, 3])),
        ]);
        let out = filter(&t, "ok", "True").unwrap();
        assert_eq!(out.column("n").unwrap().values, ints(&[1]));
        assert!(filter(&t, "ok", "true").unwrap().is_empty());
    }

    #[test]
    fn test_formula_errors_map_to_table_error() {
        let t = table(vec![("x", ints(&[1]))]);
        let err = Transform::Formula { formula: "y = nope * 2".into() }.apply(&t).unwrap_err();
        assert_eq!(err.kind(), "FormulaError");
    }

    #[test]
    fn test_failed_transform_leaves_input_untouched() {
        let t = table(vec![("x", vec![Cell::from("1"), Cell::from("oops")])]);
        let before = t.clone();
        assert!(Transform::Convert { column: "x".into(), to: CellType::Integer }
            .apply(&t)
            .is_err());
        assert_eq!(t, before);
    }
}

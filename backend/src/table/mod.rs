//! The core tabular value type.
//!
//! A [`Table`] is an ordered sequence of named [`Column`]s plus a row index.
//! Every column has the same length as the index, column names are unique,
//! and row keys are unique.
//!
//! Tables are treated as values: transforms read one table and build a new
//! one, so a failed operation never leaves a half-modified table behind.

mod cell;

pub use cell::{Cell, CellType, TIMESTAMP_FORMAT};

use serde::{Serialize, Serializer};
use std::collections::HashSet;

use crate::error::{TableError, TableResult};

// =============================================================================
// Column
// =============================================================================

/// A named sequence of cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Type of the column as a whole.
    ///
    /// Integer and float mix to float, booleans alone are boolean, any other
    /// mix is reported as `None`. An all-missing column is float.
    pub fn dtype(&self) -> Option<CellType> {
        let mut seen: Option<CellType> = None;
        for cell in &self.values {
            let Some(t) = cell.cell_type() else { continue };
            seen = match (seen, t) {
                (None, t) => Some(t),
                (Some(a), b) if a == b => Some(a),
                (Some(CellType::Integer), CellType::Float)
                | (Some(CellType::Float), CellType::Integer) => Some(CellType::Float),
                _ => return None,
            };
        }
        Some(seen.unwrap_or(CellType::Float))
    }

    /// Human-readable type name, `mixed` when [`Column::dtype`] is `None`.
    pub fn dtype_name(&self) -> String {
        self.dtype()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "mixed".to_string())
    }
}

// =============================================================================
// Table
// =============================================================================

/// Ordered named columns plus a unique row index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<Column>,
    index: Vec<Cell>,
    /// Set when the index was built from a column (set-index, group-aggregate).
    index_name: Option<String>,
}

impl Table {
    /// An empty table with no columns and no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from named columns with a fresh 0-based index.
    ///
    /// Shorter columns are padded with missing cells to the longest length.
    pub fn from_columns<N: Into<String>>(columns: Vec<(N, Vec<Cell>)>) -> TableResult<Self> {
        let mut seen = HashSet::new();
        let mut built = Vec::with_capacity(columns.len());
        for (name, values) in columns {
            let name = name.into();
            if !seen.insert(name.clone()) {
                return Err(TableError::DuplicateName(name));
            }
            built.push(Column::new(name, values));
        }

        let rows = built.iter().map(|c| c.values.len()).max().unwrap_or(0);
        for column in &mut built {
            column.values.resize(rows, Cell::Missing);
        }

        Ok(Self {
            columns: built,
            index: positional_index(rows),
            index_name: None,
        })
    }

    /// Build a table from a header row and data rows (short rows are padded,
    /// long rows truncated).
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> TableResult<Self> {
        let mut columns: Vec<(String, Vec<Cell>)> = headers
            .into_iter()
            .map(|h| (h, Vec::with_capacity(rows.len())))
            .collect();
        for row in rows {
            let mut cells = row.into_iter();
            for (_, values) in columns.iter_mut() {
                values.push(cells.next().unwrap_or_default());
            }
        }
        Self::from_columns(columns)
    }

    /// Assemble a table whose parts are already known to be consistent.
    pub(crate) fn from_parts(
        columns: Vec<Column>,
        index: Vec<Cell>,
        index_name: Option<String>,
    ) -> Self {
        debug_assert!(columns.iter().all(|c| c.values.len() == index.len()));
        Self {
            columns,
            index,
            index_name,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_position(name).is_some()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Column by name or `ColumnNotFound`.
    pub fn require_column(&self, name: &str) -> TableResult<&Column> {
        self.column(name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))
    }

    pub fn index(&self) -> &[Cell] {
        &self.index
    }

    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Cells of the row at `position`, in column order.
    pub fn row(&self, position: usize) -> Vec<&Cell> {
        self.columns.iter().map(|c| &c.values[position]).collect()
    }

    /// Iterate rows as vectors of cell references.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&Cell>> + '_ {
        (0..self.num_rows()).map(move |pos| self.row(pos))
    }

    /// Position of the row whose key equals `key`.
    ///
    /// Exact equality is tried first; a text key then matches an index cell
    /// with the same display text, so keys coming from JSON can address
    /// timestamp or float keys.
    pub fn find_row(&self, key: &Cell) -> Option<usize> {
        if let Some(pos) = self.index.iter().position(|k| k == key) {
            return Some(pos);
        }
        let text = key.as_str()?;
        self.index.iter().position(|k| k.to_string() == text)
    }

    /// A new table with the rows at `positions`, in that order.
    pub fn take_rows(&self, positions: &[usize]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                Column::new(
                    c.name.clone(),
                    positions.iter().map(|&p| c.values[p].clone()).collect(),
                )
            })
            .collect();
        let index = positions.iter().map(|&p| self.index[p].clone()).collect();
        Table::from_parts(columns, index, self.index_name.clone())
    }

    /// A new table keeping only the named columns, in the order given.
    pub fn select_columns(&self, names: &[String]) -> TableResult<Table> {
        let columns = names
            .iter()
            .map(|n| self.require_column(n).cloned())
            .collect::<TableResult<Vec<_>>>()?;
        Ok(Table::from_parts(
            columns,
            self.index.clone(),
            self.index_name.clone(),
        ))
    }

    /// A new table without the named columns. Unknown names are ignored.
    pub fn without_columns(&self, names: &[String]) -> Table {
        let columns = self
            .columns
            .iter()
            .filter(|c| !names.contains(&c.name))
            .cloned()
            .collect();
        Table::from_parts(columns, self.index.clone(), self.index_name.clone())
    }

    /// Replace the column with the same name or append a new one.
    pub(crate) fn put_column(&mut self, column: Column) {
        debug_assert_eq!(column.values.len(), self.index.len());
        match self.column_position(&column.name) {
            Some(pos) => self.columns[pos] = column,
            None => self.columns.push(column),
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<Column>, Vec<Cell>, Option<String>) {
        (self.columns, self.index, self.index_name)
    }

    /// Replace the row index with a fresh 0-based sequence.
    pub fn reset_index(&mut self) {
        self.index = positional_index(self.num_rows());
        self.index_name = None;
    }

    /// Serializable view with only the first `n` rows.
    pub fn preview(&self, n: usize) -> TableView<'_> {
        TableView {
            table: self,
            limit: n,
        }
    }
}

/// A 0-based integer index of length `rows`.
pub fn positional_index(rows: usize) -> Vec<Cell> {
    (0..rows as i64).map(Cell::Int).collect()
}

// =============================================================================
// Serialization
// =============================================================================

/// JSON view of a (possibly truncated) table.
pub struct TableView<'a> {
    table: &'a Table,
    limit: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TableJson<'a> {
    columns: Vec<&'a str>,
    dtypes: Vec<String>,
    index_name: Option<&'a str>,
    index: &'a [Cell],
    rows: Vec<Vec<&'a Cell>>,
    total_rows: usize,
}

impl Serialize for TableView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let shown = self.table.num_rows().min(self.limit);
        TableJson {
            columns: self.table.column_names(),
            dtypes: self.table.columns.iter().map(Column::dtype_name).collect(),
            index_name: self.table.index_name(),
            index: &self.table.index[..shown],
            rows: (0..shown).map(|p| self.table.row(p)).collect(),
            total_rows: self.table.num_rows(),
        }
        .serialize(serializer)
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.preview(usize::MAX).serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Table {
        Table::from_columns(vec![
            ("id", vec![Cell::Int(1), Cell::Int(2), Cell::Int(3)]),
            ("v", vec![Cell::Int(10), Cell::Int(20), Cell::Int(30)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns_pads_and_indexes() {
        let table = Table::from_columns(vec![
            ("a", vec![Cell::Int(1), Cell::Int(2)]),
            ("b", vec![Cell::Int(1)]),
        ])
        .unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.index(), &[Cell::Int(0), Cell::Int(1)]);
        assert_eq!(table.column("b").unwrap().values[1], Cell::Missing);
    }

    #[test]
    fn test_duplicate_column_names_rejected() {
        let result = Table::from_columns(vec![("a", vec![]), ("a", vec![])]);
        assert!(matches!(result, Err(TableError::DuplicateName(n)) if n == "a"));
    }

    #[test]
    fn test_from_rows_pads_short_rows() {
        let table = Table::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![Cell::Int(1)], vec![Cell::Int(2), Cell::Int(3), Cell::Int(4)]],
        )
        .unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.row(0), vec![&Cell::Int(1), &Cell::Missing]);
        assert_eq!(table.row(1), vec![&Cell::Int(2), &Cell::Int(3)]);
    }

    #[test]
    fn test_take_rows_keeps_keys() {
        let table = sample().take_rows(&[2, 0]);
        assert_eq!(table.index(), &[Cell::Int(2), Cell::Int(0)]);
        assert_eq!(table.column("v").unwrap().values, vec![Cell::Int(30), Cell::Int(10)]);
    }

    #[test]
    fn test_find_row_by_display_text() {
        let table = sample();
        assert_eq!(table.find_row(&Cell::Int(1)), Some(1));
        assert_eq!(table.find_row(&Cell::from("2")), Some(2));
        assert_eq!(table.find_row(&Cell::Int(9)), None);
    }

    #[test]
    fn test_dtype() {
        let col = Column::new("x", vec![Cell::Int(1), Cell::Float(2.5), Cell::Missing]);
        assert_eq!(col.dtype(), Some(CellType::Float));
        let col = Column::new("x", vec![Cell::Int(1), Cell::from("a")]);
        assert_eq!(col.dtype(), None);
        assert_eq!(col.dtype_name(), "mixed");
    }

    #[test]
    fn test_json_view() {
        let value = serde_json::to_value(sample().preview(2)).unwrap();
        assert_eq!(
            value,
            json!({
                "columns": ["id", "v"],
                "dtypes": ["integer", "integer"],
                "indexName": null,
                "index": [0, 1],
                "rows": [[1, 10], [2, 20]],
                "totalRows": 3
            })
        );
    }
}

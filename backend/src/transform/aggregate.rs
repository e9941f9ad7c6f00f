//! Group-by with one aggregate applied uniformly to every other column.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{TableError, TableResult};
use crate::table::{Cell, CellType, Column, Table};

/// Aggregate functions available to group-aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Sum,
    Mean,
    Count,
    Min,
    Max,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregate::Sum => "sum",
            Aggregate::Mean => "mean",
            Aggregate::Count => "count",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
        };
        f.write_str(name)
    }
}

impl Aggregate {
    /// Check that the aggregate is defined for a column, before any work is done.
    fn check(&self, column: &Column) -> TableResult<()> {
        let dtype = column.dtype();
        let ok = match self {
            Aggregate::Count => true,
            Aggregate::Sum | Aggregate::Mean => matches!(
                dtype,
                Some(CellType::Integer | CellType::Float | CellType::Boolean)
            ),
            Aggregate::Min | Aggregate::Max => dtype.is_some(),
        };
        if ok {
            Ok(())
        } else {
            Err(TableError::Aggregation {
                func: *self,
                column: column.name.clone(),
                kind: column.dtype_name(),
            })
        }
    }

    /// Aggregate the non-missing cells of one group.
    fn reduce<'a>(&self, dtype: Option<CellType>, cells: impl Iterator<Item = &'a Cell>) -> Cell {
        let present = cells.filter(|c| !c.is_missing());
        match self {
            Aggregate::Count => Cell::Int(present.count() as i64),
            Aggregate::Min => present.min().cloned().unwrap_or_default(),
            Aggregate::Max => present.max().cloned().unwrap_or_default(),
            Aggregate::Sum if dtype != Some(CellType::Float) => {
                let mut total: i64 = 0;
                let mut spill: f64 = 0.0;
                let mut overflowed = false;
                for cell in present {
                    let v = match cell {
                        Cell::Int(i) => *i,
                        Cell::Bool(b) => *b as i64,
                        _ => continue,
                    };
                    if overflowed {
                        spill += v as f64;
                    } else if let Some(t) = total.checked_add(v) {
                        total = t;
                    } else {
                        overflowed = true;
                        spill = total as f64 + v as f64;
                    }
                }
                if overflowed {
                    Cell::Float(spill)
                } else {
                    Cell::Int(total)
                }
            }
            Aggregate::Sum => Cell::Float(present.filter_map(Cell::as_f64).sum()),
            Aggregate::Mean => {
                let values: Vec<f64> = present.filter_map(Cell::as_f64).collect();
                if values.is_empty() {
                    Cell::Missing
                } else {
                    Cell::Float(values.iter().sum::<f64>() / values.len() as f64)
                }
            }
        }
    }
}

/// Partition rows by `column` and aggregate every other column with `func`.
///
/// One output row per distinct non-missing key, sorted ascending; the group
/// column becomes the row index.
pub fn group_aggregate(table: &Table, column: &str, func: Aggregate) -> TableResult<Table> {
    let keys = &table.require_column(column)?.values;
    let others: Vec<&Column> = table.columns().iter().filter(|c| c.name != column).collect();
    for other in &others {
        func.check(other)?;
    }

    let mut groups: BTreeMap<&Cell, Vec<usize>> = BTreeMap::new();
    for (pos, key) in keys.iter().enumerate() {
        if !key.is_missing() {
            groups.entry(key).or_default().push(pos);
        }
    }

    let columns = others
        .iter()
        .map(|c| {
            let dtype = c.dtype();
            let values = groups
                .values()
                .map(|rows| func.reduce(dtype, rows.iter().map(|&p| &c.values[p])))
                .collect();
            Column::new(c.name.clone(), values)
        })
        .collect();
    let index = groups.keys().map(|&k| k.clone()).collect();

    Ok(Table::from_parts(columns, index, Some(column.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> Table {
        Table::from_columns(vec![
            ("k", vec![Cell::from("A"), Cell::from("A"), Cell::from("B")]),
            ("n", vec![Cell::Int(1), Cell::Int(2), Cell::Int(3)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_group_sum_scenario() {
        let grouped = group_aggregate(&sales(), "k", Aggregate::Sum).unwrap();

        assert_eq!(grouped.index(), &[Cell::from("A"), Cell::from("B")]);
        assert_eq!(grouped.index_name(), Some("k"));
        assert_eq!(grouped.column_names(), vec!["n"]);
        assert_eq!(grouped.column("n").unwrap().values, vec![Cell::Int(3), Cell::Int(3)]);
    }

    #[test]
    fn test_group_mean_count_min_max() {
        let table = sales();
        let mean = group_aggregate(&table, "k", Aggregate::Mean).unwrap();
        assert_eq!(mean.column("n").unwrap().values, vec![Cell::Float(1.5), Cell::Float(3.0)]);

        let count = group_aggregate(&table, "k", Aggregate::Count).unwrap();
        assert_eq!(count.column("n").unwrap().values, vec![Cell::Int(2), Cell::Int(1)]);

        let min = group_aggregate(&table, "k", Aggregate::Min).unwrap();
        assert_eq!(min.column("n").unwrap().values, vec![Cell::Int(1), Cell::Int(3)]);

        let max = group_aggregate(&table, "k", Aggregate::Max).unwrap();
        assert_eq!(max.column("n").unwrap().values, vec![Cell::Int(2), Cell::Int(3)]);
    }

    #[test]
    fn test_sum_of_text_fails() {
        let table = Table::from_columns(vec![
            ("k", vec![Cell::from("A"), Cell::from("B")]),
            ("name", vec![Cell::from("x"), Cell::from("y")]),
        ])
        .unwrap();

        let err = group_aggregate(&table, "k", Aggregate::Sum).unwrap_err();
        assert!(matches!(
            err,
            TableError::Aggregation { ref column, func: Aggregate::Sum, .. } if column == "name"
        ));

        // Text columns can still be counted and compared.
        let max = group_aggregate(&table, "k", Aggregate::Max).unwrap();
        assert_eq!(max.column("name").unwrap().values, vec![Cell::from("x"), Cell::from("y")]);
    }

    #[test]
    fn test_missing_cells_and_keys_skipped() {
        let table = Table::from_columns(vec![
            ("k", vec![Cell::from("A"), Cell::Missing, Cell::from("A"), Cell::from("B")]),
            ("n", vec![Cell::Float(1.0), Cell::Float(5.0), Cell::Missing, Cell::Missing]),
        ])
        .unwrap();

        let sum = group_aggregate(&table, "k", Aggregate::Sum).unwrap();
        assert_eq!(sum.num_rows(), 2);
        assert_eq!(sum.column("n").unwrap().values, vec![Cell::Float(1.0), Cell::Float(0.0)]);

        let mean = group_aggregate(&table, "k", Aggregate::Mean).unwrap();
        assert_eq!(mean.column("n").unwrap().values, vec![Cell::Float(1.0), Cell::Missing]);
    }

    #[test]
    fn test_unknown_group_column() {
        let err = group_aggregate(&sales(), "nope", Aggregate::Sum).unwrap_err();
        assert!(matches!(err, TableError::ColumnNotFound(c) if c == "nope"));
    }
}

//! Column type conversion.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{TableError, TableResult};
use crate::table::{Cell, CellType, Column, Table};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y", "%d.%m.%Y"];

/// Cast every cell of `column` to `target`.
///
/// Fails on the first cell that cannot be represented, naming it; on success
/// every non-missing cell of the column has the target type.
pub fn convert_column(table: &Table, column: &str, target: CellType) -> TableResult<Table> {
    let source = table.require_column(column)?;
    let values = source
        .values
        .iter()
        .map(|cell| {
            convert_cell(cell, target).ok_or_else(|| TableError::Conversion {
                column: column.to_string(),
                value: if cell.is_missing() {
                    "<missing>".to_string()
                } else {
                    cell.to_string()
                },
                target,
            })
        })
        .collect::<TableResult<Vec<_>>>()?;

    let mut converted = table.clone();
    converted.put_column(Column::new(column, values));
    Ok(converted)
}

/// Convert one cell, `None` when the value has no representation in `target`.
pub fn convert_cell(cell: &Cell, target: CellType) -> Option<Cell> {
    match target {
        CellType::Integer => to_integer(cell).map(Cell::Int),
        CellType::Float => match cell {
            Cell::Missing => Some(Cell::Missing),
            Cell::Text(s) => s.trim().parse::<f64>().ok().map(Cell::Float),
            Cell::Timestamp(t) => t.and_utc().timestamp_nanos_opt().map(|n| Cell::Float(n as f64)),
            other => other.as_f64().map(Cell::Float),
        },
        CellType::Text => Some(match cell {
            Cell::Missing => Cell::Missing,
            Cell::Text(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }),
        CellType::Timestamp => match cell {
            Cell::Missing => Some(Cell::Missing),
            Cell::Timestamp(t) => Some(Cell::Timestamp(*t)),
            Cell::Int(n) => Some(Cell::Timestamp(DateTime::from_timestamp_nanos(*n).naive_utc())),
            Cell::Text(s) => parse_timestamp(s).map(Cell::Timestamp),
            _ => None,
        },
        CellType::Boolean => match cell {
            Cell::Missing => Some(Cell::Missing),
            Cell::Bool(b) => Some(Cell::Bool(*b)),
            Cell::Int(0) => Some(Cell::Bool(false)),
            Cell::Int(1) => Some(Cell::Bool(true)),
            Cell::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(Cell::Bool(true)),
                "false" | "no" | "0" => Some(Cell::Bool(false)),
                _ => None,
            },
            _ => None,
        },
    }
}

fn to_integer(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Missing => None,
        Cell::Bool(b) => Some(*b as i64),
        Cell::Int(i) => Some(*i),
        Cell::Float(f) if f.is_finite() && f.abs() < 9.2e18 => Some(f.trunc() as i64),
        Cell::Float(_) => None,
        Cell::Text(s) => s.trim().parse().ok(),
        Cell::Timestamp(t) => t.and_utc().timestamp_nanos_opt(),
    }
}

/// Parse a timestamp from the common textual layouts.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(values: Vec<Cell>) -> Table {
        Table::from_columns(vec![("x", values)]).unwrap()
    }

    #[test]
    fn test_text_to_integer() {
        let t = table(vec![Cell::from("1"), Cell::from(" 42 ")]);
        let out = convert_column(&t, "x", CellType::Integer).unwrap();
        assert_eq!(out.column("x").unwrap().values, vec![Cell::Int(1), Cell::Int(42)]);
        assert_eq!(out.column("x").unwrap().dtype(), Some(CellType::Integer));
    }

    #[test]
    fn test_conversion_error_names_offending_value() {
        let t = table(vec![Cell::from("1"), Cell::from("abc"), Cell::from("x")]);
        let err = convert_column(&t, "x", CellType::Integer).unwrap_err();
        match err {
            TableError::Conversion { column, value, target } => {
                assert_eq!(column, "x");
                assert_eq!(value, "abc");
                assert_eq!(target, CellType::Integer);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_cannot_become_integer() {
        let t = table(vec![Cell::Int(1), Cell::Missing]);
        assert!(convert_column(&t, "x", CellType::Integer).is_err());

        let out = convert_column(&t, "x", CellType::Float).unwrap();
        assert_eq!(out.column("x").unwrap().values, vec![Cell::Float(1.0), Cell::Missing]);
    }

    #[test]
    fn test_float_truncates_to_integer() {
        let t = table(vec![Cell::Float(2.9), Cell::Float(-2.9)]);
        let out = convert_column(&t, "x", CellType::Integer).unwrap();
        assert_eq!(out.column("x").unwrap().values, vec![Cell::Int(2), Cell::Int(-2)]);
    }

    #[test]
    fn test_to_text() {
        let t = table(vec![Cell::Int(7), Cell::Float(1.5), Cell::Bool(true)]);
        let out = convert_column(&t, "x", CellType::Text).unwrap();
        assert_eq!(
            out.column("x").unwrap().values,
            vec![Cell::from("7"), Cell::from("1.5"), Cell::from("True")]
        );
    }

    #[test]
    fn test_text_to_timestamp() {
        let t = table(vec![
            Cell::from("2024-03-01"),
            Cell::from("2024-03-01 10:30:00"),
            Cell::from("2024-03-01T10:30:00Z"),
        ]);
        let out = convert_column(&t, "x", CellType::Timestamp).unwrap();
        let shown: Vec<String> = out.column("x").unwrap().values.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            shown,
            vec!["2024-03-01 00:00:00", "2024-03-01 10:30:00", "2024-03-01 10:30:00"]
        );
    }

    #[test]
    fn test_bad_timestamp() {
        let t = table(vec![Cell::from("not a date")]);
        let err = convert_column(&t, "x", CellType::Timestamp).unwrap_err();
        assert!(err.to_string().contains("not a date"));
    }

    #[test]
    fn test_unknown_column() {
        let t = table(vec![Cell::Int(1)]);
        assert!(matches!(
            convert_column(&t, "y", CellType::Float),
            Err(TableError::ColumnNotFound(_))
        ));
    }
}

//! Table export.
//!
//! - [`serialize`] writes one XLSX sheet named "Cleaned Data", header row =
//!   column names
//! - [`serialize_csv`] writes the same layout as comma-separated text
//!
//! A named index (set-index, group-aggregate results) is written as the
//! leading column so the row keys survive the export. A positional index is
//! not written.

use chrono::{NaiveDate, NaiveDateTime};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ExportError, ExportResult};
use crate::table::{Cell, Table};

/// Name of the single exported worksheet.
pub const SHEET_NAME: &str = "Cleaned Data";

/// Data rows that fit below the header in one worksheet.
pub const MAX_XLSX_ROWS: usize = 1_048_575;

/// Columns in one worksheet.
pub const MAX_XLSX_COLUMNS: usize = 16_384;

const DATETIME_NUM_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ExportFormat {
    /// Pick the format from an output path, XLSX unless it ends in `.csv`.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ExportFormat::Csv,
            _ => ExportFormat::Xlsx,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }
}

/// Serialize in the requested format.
pub fn export(table: &Table, format: ExportFormat) -> ExportResult<Vec<u8>> {
    match format {
        ExportFormat::Xlsx => serialize(table),
        ExportFormat::Csv => serialize_csv(table),
    }
}

/// Header names and per-row cells, with the named index in front.
fn layout(table: &Table) -> (Vec<String>, Vec<Vec<&Cell>>) {
    let names = table.column_names();
    let index_header = table.index_name().map(|name| index_header(name, &names));
    let mut headers = Vec::with_capacity(names.len() + 1);
    headers.extend(index_header.iter().cloned());
    headers.extend(names.iter().map(|n| n.to_string()));

    let rows = (0..table.num_rows())
        .map(|pos| {
            let mut row = Vec::with_capacity(headers.len());
            if index_header.is_some() {
                row.push(&table.index()[pos]);
            }
            row.extend(table.row(pos));
            row
        })
        .collect();
    (headers, rows)
}

/// Header for the index column; `_index` is appended while it clashes with a column.
fn index_header(name: &str, columns: &[&str]) -> String {
    let mut header = name.to_string();
    while columns.contains(&header.as_str()) {
        header.push_str("_index");
    }
    header
}

// =============================================================================
// XLSX
// =============================================================================

/// Serialize a table to XLSX bytes.
pub fn serialize(table: &Table) -> ExportResult<Vec<u8>> {
    if table.num_rows() > MAX_XLSX_ROWS {
        return Err(ExportError::TooManyRows {
            rows: table.num_rows(),
            max: MAX_XLSX_ROWS,
        });
    }
    let (headers, rows) = layout(table);
    if headers.len() > MAX_XLSX_COLUMNS {
        return Err(ExportError::TooManyColumns {
            columns: headers.len(),
            max: MAX_XLSX_COLUMNS,
        });
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    let header_format = Format::new().set_bold();
    let datetime_format = Format::new().set_num_format(DATETIME_NUM_FORMAT);

    for (col, name) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, &header_format)?;
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            write_cell(worksheet, r as u32 + 1, c as u16, cell, &datetime_format)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    datetime_format: &Format,
) -> ExportResult<()> {
    match cell {
        Cell::Missing => {}
        Cell::Bool(b) => {
            worksheet.write_boolean(row, col, *b)?;
        }
        Cell::Int(i) => {
            worksheet.write_number(row, col, *i as f64)?;
        }
        Cell::Float(f) if f.is_finite() => {
            worksheet.write_number(row, col, *f)?;
        }
        Cell::Float(_) => {}
        Cell::Text(s) => {
            worksheet.write_string(row, col, s)?;
        }
        Cell::Timestamp(t) => {
            worksheet.write_number_with_format(row, col, excel_serial(t), datetime_format)?;
        }
    }
    Ok(())
}

/// Days since 1899-12-30, the spreadsheet date epoch.
pub fn excel_serial(timestamp: &NaiveDateTime) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    (*timestamp - epoch).num_milliseconds() as f64 / 86_400_000.0
}

// =============================================================================
// CSV
// =============================================================================

/// Serialize a table to UTF-8 CSV bytes. Missing cells are empty fields.
pub fn serialize_csv(table: &Table) -> ExportResult<Vec<u8>> {
    let (headers, rows) = layout(table);
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&headers)?;
    for row in rows {
        writer.write_record(row.iter().map(|c| c.to_string()))?;
    }
    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, TableFormat};

    fn sample() -> Table {
        Table::from_columns(vec![
            ("name", vec![Cell::from("a"), Cell::from("b"), Cell::Missing]),
            ("n", vec![Cell::Int(1), Cell::Int(2), Cell::Int(3)]),
            ("x", vec![Cell::Float(0.5), Cell::Missing, Cell::Float(2.25)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_xlsx_reads_back() {
        let bytes = serialize(&sample()).unwrap();
        let parsed = parse(&bytes, TableFormat::Spreadsheet).unwrap();

        assert_eq!(parsed.sheet.as_deref(), Some(SHEET_NAME));
        let table = parsed.table;
        assert_eq!(table.column_names(), vec!["name", "n", "x"]);
        assert_eq!(table.column("n").unwrap().values, vec![Cell::Int(1), Cell::Int(2), Cell::Int(3)]);
        assert_eq!(
            table.column("name").unwrap().values,
            vec![Cell::from("a"), Cell::from("b"), Cell::Missing]
        );
        assert_eq!(
            table.column("x").unwrap().values,
            vec![Cell::Float(0.5), Cell::Missing, Cell::Float(2.25)]
        );
    }

    #[test]
    fn test_named_index_written_first() {
        let indexed = crate::transform::set_index(&sample().take_rows(&[0, 1]), "name").unwrap();
        let csv = String::from_utf8(serialize_csv(&indexed).unwrap()).unwrap();
        assert_eq!(csv, "name,n,x\na,1,0.5\nb,2,\n");
    }

    #[test]
    fn test_index_header_does_not_clash_with_column() {
        let indexed = crate::transform::set_index(&sample().take_rows(&[0, 1]), "name").unwrap();
        let renamed = crate::transform::rename(&indexed, "n", "name").unwrap();
        let csv = String::from_utf8(serialize_csv(&renamed).unwrap()).unwrap();
        assert_eq!(csv, "name_index,name,x\na,1,0.5\nb,2,\n");
    }

    #[test]
    fn test_csv_booleans_written_as_display_text() {
        let table = Table::from_columns(vec![("ok", vec![Cell::Bool(true), Cell::Bool(false)])]).unwrap();
        let csv = String::from_utf8(serialize_csv(&table).unwrap()).unwrap();
        assert_eq!(csv, "ok\nTrue\nFalse\n");
    }

    #[test]
    fn test_csv_positional_index_not_written() {
        let csv = String::from_utf8(serialize_csv(&sample()).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("name,n,x"));
        assert_eq!(lines.next(), Some("a,1,0.5"));
        assert_eq!(lines.next(), Some("b,2,"));
        assert_eq!(lines.next(), Some(",3,2.25"));
    }

    #[test]
    fn test_excel_serial() {
        let t = NaiveDate::from_ymd_opt(1900, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(excel_serial(&t), 2.5);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ExportFormat::from_path(Path::new("out.CSV")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_path(Path::new("out.xlsx")), ExportFormat::Xlsx);
        assert_eq!(ExportFormat::from_path(Path::new("out")), ExportFormat::Xlsx);
    }
}

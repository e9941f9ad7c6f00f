//! Upload parsing: delimited text and spreadsheets into a [`Table`].
//!
//! Delimited input goes through encoding detection, delimiter detection and
//! per-column type inference. Spreadsheets are read from their first sheet,
//! whose first row is the header.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use crate::error::{ParseError, ParseResult};
use crate::table::{Cell, Table};

/// Tokens read as missing values in delimited text.
const MISSING_TOKENS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

/// Input format of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableFormat {
    /// CSV / TSV and other delimiter-separated text.
    Delimited,
    /// XLSX / XLS / ODS workbooks.
    Spreadsheet,
}

impl TableFormat {
    /// Pick the format from a file name's extension.
    pub fn from_file_name(name: &str) -> ParseResult<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Ok(TableFormat::Delimited),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(TableFormat::Spreadsheet),
            _ => Err(ParseError::UnsupportedFormat(name.to_string())),
        }
    }
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParsedTable {
    /// The decoded table, with a 0-based index
    pub table: Table,
    /// Detected encoding (delimited input only)
    pub encoding: Option<String>,
    /// Detected delimiter (delimited input only)
    pub delimiter: Option<char>,
    /// Sheet that was read (spreadsheet input only)
    pub sheet: Option<String>,
}

/// Parse uploaded bytes in the given format.
pub fn parse(bytes: &[u8], format: TableFormat) -> ParseResult<ParsedTable> {
    match format {
        TableFormat::Delimited => parse_delimited(bytes),
        TableFormat::Spreadsheet => parse_spreadsheet(bytes),
    }
}

/// Parse a file from disk, choosing the format by extension.
pub fn parse_file<P: AsRef<Path>>(path: P) -> ParseResult<ParsedTable> {
    let path = path.as_ref();
    let format = TableFormat::from_file_name(&path.to_string_lossy())?;
    let bytes = std::fs::read(path)?;
    parse(&bytes, format)
}

// =============================================================================
// Delimited text
// =============================================================================

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        // Fallback: UTF-8 with lossy conversion
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Detect the delimiter by counting unquoted occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let mut in_quotes = false;
        let count = first_line
            .chars()
            .filter(|&c| {
                if c == '"' {
                    in_quotes = !in_quotes;
                }
                c == sep && !in_quotes
            })
            .count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse delimited bytes with encoding and delimiter auto-detection.
pub fn parse_delimited(bytes: &[u8]) -> ParseResult<ParsedTable> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    if content.trim().is_empty() {
        return Err(ParseError::EmptyInput);
    }
    let delimiter = detect_delimiter(&content);
    let table = parse_delimited_str(&content, delimiter)?;
    Ok(ParsedTable {
        table,
        encoding: Some(encoding),
        delimiter: Some(delimiter),
        sheet: None,
    })
}

/// Parse already-decoded delimited text with an explicit delimiter.
///
/// # Example
/// ```ignore
/// use tabwright::parser::parse_delimited_str;
///
/// let table = parse_delimited_str("name;age\nAlice;30\nBob;25", ';').unwrap();
/// assert_eq!(table.num_rows(), 2);
/// ```
pub fn parse_delimited_str(content: &str, delimiter: char) -> ParseResult<Table> {
    let delimiter = u8::try_from(delimiter).map_err(|_| ParseError::Delimited {
        line: 1,
        message: format!("delimiter '{delimiter}' is not a single byte"),
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(ParseError::NoHeaders);
    }
    let headers = normalize_headers(headers);

    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        for (i, column) in raw.iter_mut().enumerate() {
            let value = record.get(i).map(str::trim).unwrap_or("");
            column.push(if MISSING_TOKENS.contains(&value) {
                None
            } else {
                Some(value.to_string())
            });
        }
    }

    let columns = headers
        .into_iter()
        .zip(raw)
        .map(|(name, values)| (name, infer_cells(values)))
        .collect();
    Table::from_columns(columns).map_err(|e| ParseError::Delimited {
        line: 1,
        message: e.to_string(),
    })
}

fn csv_error(err: csv::Error) -> ParseError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    ParseError::Delimited {
        line,
        message: err.to_string(),
    }
}

/// Give blank headers a positional name and suffix duplicates with `.1`, `.2`...
fn normalize_headers(headers: Vec<String>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(headers.len());
    for (i, header) in headers.into_iter().enumerate() {
        let base = if header.is_empty() {
            format!("Unnamed: {i}")
        } else {
            header
        };
        let mut name = base.clone();
        while out.contains(&name) {
            let n = counts.entry(base.clone()).or_insert(0);
            *n += 1;
            name = format!("{base}.{n}");
        }
        out.push(name);
    }
    out
}

/// Infer one type for a whole column of raw text values.
fn infer_cells(values: Vec<Option<String>>) -> Vec<Cell> {
    let present = || values.iter().flatten();

    if present().all(|v| v.parse::<i64>().is_ok()) {
        return values
            .iter()
            .map(|v| v.as_deref().and_then(|s| s.parse().ok()).map(Cell::Int).unwrap_or_default())
            .collect();
    }
    if present().all(|v| v.parse::<f64>().is_ok()) {
        return values
            .iter()
            .map(|v| v.as_deref().and_then(|s| s.parse().ok()).map(Cell::Float).unwrap_or_default())
            .collect();
    }
    if present().all(|v| parse_bool(v).is_some()) {
        return values
            .iter()
            .map(|v| v.as_deref().and_then(parse_bool).map(Cell::Bool).unwrap_or_default())
            .collect();
    }
    values.into_iter().map(Cell::from).collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

// =============================================================================
// Spreadsheets
// =============================================================================

/// Parse the first sheet of a workbook. The first row is the header.
pub fn parse_spreadsheet(bytes: &[u8]) -> ParseResult<ParsedTable> {
    if bytes.is_empty() {
        return Err(ParseError::EmptyInput);
    }
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ParseError::Spreadsheet(e.to_string()))?;
    let sheet = workbook.sheet_names().first().cloned();
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ParseError::EmptyInput)?
        .map_err(|e| ParseError::Spreadsheet(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or(ParseError::NoHeaders)?
        .iter()
        .map(|c| data_to_cell(c).to_string().trim().to_string())
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(ParseError::NoHeaders);
    }
    let headers = normalize_headers(headers);

    let data: Vec<Vec<Cell>> = rows
        .map(|r| r.iter().map(data_to_cell).collect())
        .filter(|r: &Vec<Cell>| r.iter().any(|c| !c.is_missing()))
        .collect();

    let table = Table::from_rows(headers, data)
        .map_err(|e| ParseError::Spreadsheet(e.to_string()))?;
    Ok(ParsedTable {
        table: integral_floats_to_ints(table),
        encoding: None,
        delimiter: None,
        sheet,
    })
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Int(v) => Cell::Int(*v),
        Data::Float(v) => Cell::Float(*v),
        Data::String(v) if v.trim().is_empty() => Cell::Missing,
        Data::String(v) => Cell::Text(v.clone()),
        Data::Bool(v) => Cell::Bool(*v),
        Data::DateTime(v) => excel_serial_to_datetime(v.as_f64())
            .map(Cell::Timestamp)
            .unwrap_or(Cell::Float(v.as_f64())),
        Data::DateTimeIso(v) => NaiveDateTime::parse_from_str(v, "%Y-%m-%dT%H:%M:%S%.f")
            .map(Cell::Timestamp)
            .unwrap_or_else(|_| Cell::Text(v.clone())),
        Data::DurationIso(v) => Cell::Text(v.clone()),
        Data::Error(_) | Data::Empty => Cell::Missing,
    }
}

/// Convert an Excel serial date (days since 1899-12-30) to a timestamp.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(TimeDelta::try_milliseconds(millis)?)
}

/// Workbooks store every number as a float; columns holding only whole
/// numbers become integer columns.
fn integral_floats_to_ints(table: Table) -> Table {
    let (columns, index, index_name) = table.into_parts();
    let columns = columns
        .into_iter()
        .map(|mut column| {
            let integral = column.values.iter().all(|c| match c {
                Cell::Missing | Cell::Int(_) => true,
                Cell::Float(f) => f.fract() == 0.0 && f.abs() < 9.0e15,
                _ => false,
            });
            let has_float = column.values.iter().any(|c| matches!(c, Cell::Float(_)));
            if integral && has_float {
                for cell in &mut column.values {
                    if let Cell::Float(f) = cell {
                        *cell = Cell::Int(*f as i64);
                    }
                }
            }
            column
        })
        .collect();
    Table::from_parts(columns, index, index_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CellType;

    #[test]
    fn test_simple_csv() {
        let table = parse_delimited_str("name;age\nAlice;30\nBob;25", ';').unwrap();

        assert_eq!(table.column_names(), vec!["name", "age"]);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column("name").unwrap().values[0], Cell::from("Alice"));
        assert_eq!(table.column("age").unwrap().values[1], Cell::Int(25));
        assert_eq!(table.index(), &[Cell::Int(0), Cell::Int(1)]);
    }

    #[test]
    fn test_type_inference() {
        let table = parse_delimited_str("i,f,b,t\n1,1.5,true,x\n2,,False,\n", ',').unwrap();

        assert_eq!(table.column("i").unwrap().dtype(), Some(CellType::Integer));
        assert_eq!(table.column("f").unwrap().dtype(), Some(CellType::Float));
        assert_eq!(table.column("f").unwrap().values[1], Cell::Missing);
        assert_eq!(table.column("b").unwrap().values[1], Cell::Bool(false));
        assert_eq!(table.column("t").unwrap().values[1], Cell::Missing);
    }

    #[test]
    fn test_quoted_values() {
        let csv = "name;value\n\"Alice\";\"Hello; World\"";
        let table = parse_delimited_str(csv, ';').unwrap();

        assert_eq!(table.column("value").unwrap().values[0], Cell::from("Hello; World"));
    }

    #[test]
    fn test_missing_values() {
        let table = parse_delimited_str("a;b;c\n1;;3\n4;NA;6", ';').unwrap();

        assert_eq!(table.column("b").unwrap().values, vec![Cell::Missing, Cell::Missing]);
        assert_eq!(table.column("c").unwrap().values, vec![Cell::Int(3), Cell::Int(6)]);
    }

    #[test]
    fn test_extra_columns_ignored() {
        let table = parse_delimited_str("a;b\n1;2;3;4", ';').unwrap();
        assert_eq!(table.num_columns(), 2);
        assert_eq!(table.row(0), vec![&Cell::Int(1), &Cell::Int(2)]);
    }

    #[test]
    fn test_duplicate_and_blank_headers() {
        let table = parse_delimited_str("a,a,,a\n1,2,3,4", ',').unwrap();
        assert_eq!(table.column_names(), vec!["a", "a.1", "Unnamed: 2", "a.2"]);
    }

    #[test]
    fn test_empty_input_error() {
        let result = parse(b"   \n", TableFormat::Delimited);
        assert!(matches!(result, Err(ParseError::EmptyInput)));
    }

    #[test]
    fn test_garbage_spreadsheet_is_parse_error() {
        let result = parse(b"definitely not a workbook", TableFormat::Spreadsheet);
        assert!(matches!(result, Err(ParseError::Spreadsheet(_))));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
        assert_eq!(detect_delimiter("\"x;y\",b,c\n1,2,3"), ',');
    }

    #[test]
    fn test_auto_parse() {
        let parsed = parse(b"name;age\nAlice;30\nBob;25", TableFormat::Delimited).unwrap();

        assert_eq!(parsed.delimiter, Some(';'));
        assert_eq!(parsed.encoding.as_deref(), Some("utf-8"));
        assert_eq!(parsed.table.num_rows(), 2);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_format_from_file_name() {
        assert_eq!(TableFormat::from_file_name("a.CSV").unwrap(), TableFormat::Delimited);
        assert_eq!(TableFormat::from_file_name("b.xlsx").unwrap(), TableFormat::Spreadsheet);
        assert!(TableFormat::from_file_name("c.pdf").is_err());
    }

    #[test]
    fn test_excel_serial_dates() {
        let dt = excel_serial_to_datetime(45292.5).unwrap();
        assert_eq!(dt.to_string(), "2024-01-01 12:00:00");
    }

    #[test]
    fn test_parse_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        std::fs::write(&path, "id,name\n1,Ann\n2,Bo\n").unwrap();

        let parsed = parse_file(&path).unwrap();
        assert_eq!(parsed.table.num_rows(), 2);
        assert_eq!(parsed.delimiter, Some(','));
    }
}

//! Error types for tabular editing sessions.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`ParseError`] - Delimited text / spreadsheet decoding errors
//! - [`FormulaError`] - Formula column parsing and evaluation errors
//! - [`TableError`] - Every recoverable failure of a core operation
//! - [`ExportError`] - Spreadsheet / CSV serialization errors
//! - [`ServerError`] - HTTP adapter errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

use crate::table::CellType;
use crate::transform::Aggregate;

// =============================================================================
// Parsing Errors
// =============================================================================

/// Errors while decoding uploaded bytes into a table.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed delimited text.
    #[error("Invalid delimited text at line {line}: {message}")]
    Delimited { line: u64, message: String },

    /// Spreadsheet could not be opened or read.
    #[error("Invalid spreadsheet: {0}")]
    Spreadsheet(String),

    /// Empty input.
    #[error("Input is empty")]
    EmptyInput,

    /// No header row.
    #[error("No header row found")]
    NoHeaders,

    /// File extension not recognised as tabular data.
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),
}

// =============================================================================
// Formula Errors
// =============================================================================

/// Errors from `name = expression` formula columns.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// The text is not of the form `name = expression`.
    #[error("Formula must look like `name = expression`: {0}")]
    MissingAssignment(String),

    /// Tokenizer or grammar error.
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    /// Expression references a column the table does not have.
    #[error("Unknown column '{0}' in formula")]
    UnknownColumn(String),

    /// Arithmetic on a value that is not numeric.
    #[error("Cannot apply '{op}' to {kind} value '{value}' in column '{column}'")]
    TypeMismatch {
        op: char,
        column: String,
        value: String,
        kind: CellType,
    },
}

// =============================================================================
// Table Errors (core taxonomy)
// =============================================================================

/// Failure of a single core operation.
///
/// Whenever one of these is returned, the dataset's table and edit history
/// are exactly as they were before the call.
#[derive(Debug, Error)]
pub enum TableError {
    /// Upload could not be decoded.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Named column is absent from the table.
    #[error("Column not found: '{0}'")]
    ColumnNotFound(String),

    /// Row key is absent from the row index.
    #[error("Row not found: {0}")]
    RowNotFound(String),

    /// A cell could not be parsed into the target type.
    #[error("Cannot convert value '{value}' in column '{column}' to {target}")]
    Conversion {
        column: String,
        value: String,
        target: CellType,
    },

    /// The aggregate is not defined for a column's type.
    #[error("Aggregate '{func}' is not defined for column '{column}' of type {kind}")]
    Aggregation {
        func: Aggregate,
        column: String,
        kind: String,
    },

    /// Row keys would not be unique.
    #[error("Duplicate index key '{key}' from column '{column}'")]
    DuplicateIndex { column: String, key: String },

    /// Column name already used.
    #[error("Column '{0}' already exists")]
    DuplicateName(String),

    /// Formula column failure.
    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),

    /// Merge key missing from one of the tables.
    #[error("Merge key '{key}' not found in dataset '{dataset}'")]
    MergeKey { key: String, dataset: String },

    /// Nothing in the snapshot matches the restore request.
    #[error("Nothing to restore: {0}")]
    NothingToRestore(String),

    /// No dataset with this id is loaded.
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),
}

impl TableError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            TableError::Parse(_) => "ParseError",
            TableError::ColumnNotFound(_) => "ColumnNotFound",
            TableError::RowNotFound(_) => "RowNotFound",
            TableError::Conversion { .. } => "ConversionError",
            TableError::Aggregation { .. } => "AggregationError",
            TableError::DuplicateIndex { .. } => "DuplicateIndexError",
            TableError::DuplicateName(_) => "DuplicateNameError",
            TableError::Formula(_) => "FormulaError",
            TableError::MergeKey { .. } => "MergeKeyError",
            TableError::NothingToRestore(_) => "NothingToRestore",
            TableError::UnknownDataset(_) => "UnknownDataset",
        }
    }
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while serializing a table.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Spreadsheet writer failure.
    #[error("Spreadsheet export failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// CSV writer failure.
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    /// Table does not fit in one worksheet.
    #[error("Table has {rows} rows, a worksheet holds at most {max}")]
    TooManyRows { rows: usize, max: usize },

    /// Table is wider than one worksheet.
    #[error("Table has {columns} columns, a worksheet holds at most {max}")]
    TooManyColumns { columns: usize, max: usize },

    /// IO error.
    #[error("Export IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Core operation failed.
    #[error("{0}")]
    Table(#[from] TableError),

    /// Export failed.
    #[error("{0}")]
    Export(#[from] ExportError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upload over the configured limit.
    #[error("Upload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    /// Server IO error.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for parsing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for core table operations.
pub type TableResult<T> = Result<T, TableError>;

/// Result type for export.
pub type ExportResult<T> = Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // ParseError -> TableError
        let parse_err = ParseError::EmptyInput;
        let table_err: TableError = parse_err.into();
        assert_eq!(table_err.kind(), "ParseError");
        assert!(table_err.to_string().contains("empty"));

        // FormulaError -> TableError -> ServerError
        let formula_err = FormulaError::UnknownColumn("price".into());
        let table_err: TableError = formula_err.into();
        let server_err: ServerError = table_err.into();
        assert!(server_err.to_string().contains("price"));
    }

    #[test]
    fn test_conversion_error_names_value() {
        let err = TableError::Conversion {
            column: "age".into(),
            value: "abc".into(),
            target: CellType::Integer,
        };
        let msg = err.to_string();
        assert!(msg.contains("age"));
        assert!(msg.contains("'abc'"));
        assert!(msg.contains("integer"));
        assert_eq!(err.kind(), "ConversionError");
    }
}

//! # Tabwright - reversible tabular editing sessions
//!
//! Tabwright loads delimited text and spreadsheets into typed tables, edits
//! them through transforms and reversible column/row drops, combines several
//! datasets into one, and exports the result as XLSX or CSV.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ CSV / XLSX  │────▶│   Parser    │────▶│   Session   │────▶│   Export    │
//! │  (any enc)  │     │ (auto-det.) │     │ (edit+undo) │     │ (xlsx/csv)  │
//! └─────────────┘     └─────────────┘     └──────┬──────┘     └─────────────┘
//!                                                │
//!                                         ┌──────▼──────┐
//!                                         │   Combine   │
//!                                         └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tabwright::{Session, TableFormat, Transform};
//!
//! let mut session = Session::new();
//! session.load("a.csv", b"id,v\n1,10\n1,10\n", TableFormat::Delimited)?;
//! session.apply_transform("a.csv", &Transform::Deduplicate)?;
//! session.drop_columns("a.csv", &["v".to_string()])?;
//! session.restore_columns("a.csv", &["v".to_string()])?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`table`] - Typed cells, columns and the indexed table
//! - [`parser`] - Delimited/spreadsheet parsing with auto-detection
//! - [`history`] - Reversible column and row drops
//! - [`transform`] - Transforms, formulas and scripted steps
//! - [`combine`] - Concatenate or merge datasets
//! - [`session`] - Loaded datasets and their edit state
//! - [`export`] - XLSX and CSV serialization
//! - [`config`] - Server configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod table;

// Parsing
pub mod parser;

// Editing
pub mod history;
pub mod transform;
pub mod combine;
pub mod session;

// Output
pub mod export;

// HTTP API
pub mod config;
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ExportError, ExportResult, FormulaError, ParseError, ParseResult, ServerError, TableError,
    TableResult,
};

// =============================================================================
// Re-exports - Table
// =============================================================================

pub use table::{Cell, CellType, Column, Table, TableView};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{parse, parse_file, ParsedTable, TableFormat};

// =============================================================================
// Re-exports - Editing
// =============================================================================

pub use history::{EditHistory, HistorySummary};

pub use transform::{
    example_script, transforms_description, Aggregate, Formula, Script, Step, Transform,
};

pub use combine::{combine, CombineMode};

pub use session::{Combined, Dataset, DatasetSummary, Session, COMBINED_ID};

// =============================================================================
// Re-exports - Export
// =============================================================================

pub use export::{export, ExportFormat};

// =============================================================================
// Re-exports - Server
// =============================================================================

pub use config::ServerConfig;

// Server
pub mod server {
    pub use crate::api::server::start_server;
}

//! REST API types for frontend integration.
//!
//! Tables are returned as the JSON view from [`crate::table::TableView`]
//! (`columns`, `dtypes`, `indexName`, `index`, `rows`, `totalRows`), truncated
//! to a preview; exports carry the full table.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::combine::CombineMode;
use crate::error::{ServerError, TableError};
use crate::export::ExportFormat;
use crate::history::EditHistory;
use crate::table::{Cell, Table};
use crate::transform::Transform;

/// Rows included in table previews unless `?rows=` says otherwise.
pub const DEFAULT_PREVIEW_ROWS: usize = 100;

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<Value>);

/// Body of the column drop/restore endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnsRequest {
    pub names: Vec<String>,
}

/// Body of the row drop/restore endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowsRequest {
    pub keys: Vec<Cell>,
}

/// Body of `/api/combine` and `/api/combine/export`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineRequest {
    pub combine: CombineMode,
    /// Transforms applied to the combined table, in order
    #[serde(default)]
    pub transforms: Vec<Transform>,
}

/// `?rows=` on table responses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreviewQuery {
    pub rows: Option<usize>,
}

impl PreviewQuery {
    pub fn limit(&self) -> usize {
        self.rows.unwrap_or(DEFAULT_PREVIEW_ROWS)
    }
}

/// `?format=` on export endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

/// Response for one dataset: its table preview and edit history.
pub fn dataset_response(id: &str, table: &Table, history: &EditHistory, rows: usize) -> Value {
    json!({
        "requestId": Uuid::new_v4().to_string(),
        "status": "ok",
        "dataset": id,
        "table": table.preview(rows),
        "history": history.summary(),
    })
}

/// Response for the combined table.
pub fn combined_response(mode: &CombineMode, table: &Table, rows: usize) -> Value {
    json!({
        "requestId": Uuid::new_v4().to_string(),
        "status": "ok",
        "mode": mode,
        "table": table.preview(rows),
    })
}

/// Create an error response
pub fn error_response(operation: &str, error: &str, kind: &str) -> Value {
    json!({
        "requestId": Uuid::new_v4().to_string(),
        "status": "error",
        "operation": operation,
        "error": error,
        "kind": kind,
    })
}

impl ServerError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Table(TableError::UnknownDataset(_)) => StatusCode::NOT_FOUND,
            ServerError::Table(TableError::Parse(_)) => StatusCode::BAD_REQUEST,
            ServerError::Table(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Export(_) | ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::Table(e) => e.kind(),
            ServerError::Export(_) => "ExportError",
            ServerError::BadRequest(_) => "BadRequest",
            ServerError::PayloadTooLarge { .. } => "PayloadTooLarge",
            ServerError::Io(_) => "IoError",
        }
    }
}

/// Turn any error into the `(status, body)` pair handlers return.
pub fn api_error(operation: &str, error: impl Into<ServerError>) -> ApiError {
    let error = error.into();
    (
        error.status(),
        Json(error_response(operation, &error.to_string(), error.kind())),
    )
}

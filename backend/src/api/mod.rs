//! HTTP API module.
//!
//! The axum server, its request/response types and the SSE log stream
//! shared by every session operation.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::{log_error, log_info, log_success, log_warning, LogEntry, LogLevel};
pub use server::{router, start_server, AppState};
pub use types::{api_error, ApiError, DEFAULT_PREVIEW_ROWS};

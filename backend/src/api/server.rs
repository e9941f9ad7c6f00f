//! HTTP Server for the tabwright API.
//!
//! A thin adapter over one shared [`Session`]; every handler performs one
//! session operation under the session lock.
//!
//! # API Endpoints
//!
//! | Method | Path                                   | Description                       |
//! |--------|----------------------------------------|-----------------------------------|
//! | GET    | `/health`                              | Health check                      |
//! | GET    | `/api/datasets`                        | List loaded datasets              |
//! | POST   | `/api/datasets`                        | Upload one or more files          |
//! | GET    | `/api/datasets/{id}`                   | Table preview and edit history    |
//! | POST   | `/api/datasets/{id}/transform`         | Apply a transform                 |
//! | POST   | `/api/datasets/{id}/columns/drop`      | Drop columns                      |
//! | POST   | `/api/datasets/{id}/columns/restore`   | Restore dropped columns           |
//! | POST   | `/api/datasets/{id}/rows/drop`         | Drop rows by key                  |
//! | POST   | `/api/datasets/{id}/rows/restore`      | Restore dropped rows              |
//! | GET    | `/api/datasets/{id}/export`            | Download as XLSX (or `?format=csv`) |
//! | POST   | `/api/combine`                         | Combine all datasets              |
//! | POST   | `/api/combine/export`                  | Combine and download              |
//! | POST   | `/api/combine/transform`               | Transform the combined table      |
//! | GET    | `/api/logs`                            | SSE stream for real-time logs     |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{
    api_error, combined_response, dataset_response, ApiError, ColumnsRequest,
    CombineRequest, ExportQuery, PreviewQuery, RowsRequest,
};
use crate::config::ServerConfig;
use crate::error::{ServerError, TableError};
use crate::export::{export, ExportFormat};
use crate::parser::TableFormat;
use crate::session::{Session, COMBINED_ID};
use crate::table::Table;
use crate::transform::Transform;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<Session>>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new())),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Build the router with all routes and layers
pub fn router(config: &ServerConfig, state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/datasets", get(list_datasets).post(upload_datasets))
        .route("/api/datasets/{id}", get(get_dataset))
        .route("/api/datasets/{id}/transform", post(apply_transform))
        .route("/api/datasets/{id}/columns/drop", post(drop_columns))
        .route("/api/datasets/{id}/columns/restore", post(restore_columns))
        .route("/api/datasets/{id}/rows/drop", post(drop_rows))
        .route("/api/datasets/{id}/rows/restore", post(restore_rows))
        .route("/api/datasets/{id}/export", get(export_dataset))
        .route("/api/combine", post(combine_datasets))
        .route("/api/combine/export", post(export_combined))
        .route("/api/combine/transform", post(transform_combined))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors)
        .with_state(state);

    match &config.static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app.route("/", get(health)),
    }
}

/// Start the HTTP server
pub async fn start_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.socket_addr();
    let app = router(&config, AppState::new(&config));

    println!("🚀 Tabwright server running on http://{}", addr);
    println!("   POST /api/datasets           - Upload files");
    println!("   POST /api/datasets/{{id}}/...  - Transform, drop, restore");
    println!("   POST /api/combine            - Combine datasets");
    println!("   GET  /api/logs               - SSE log stream");
    println!("   GET  /health                 - Health check");
    if let Some(dir) = &config.static_dir {
        println!("   Serving static files from {}", dir.display());
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "tabwright",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "datasets": "GET|POST /api/datasets",
            "combine": "POST /api/combine",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

// =============================================================================
// Datasets
// =============================================================================

async fn list_datasets(State(state): State<AppState>) -> Json<Value> {
    let session = state.session.lock().await;
    Json(json!({
        "status": "ok",
        "datasets": session.list_datasets(),
    }))
}

/// Upload endpoint; every `file` field becomes a dataset named after the file.
async fn upload_datasets(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error("upload", ServerError::BadRequest(format!("Multipart error: {e}"))))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or_else(|| api_error("upload", ServerError::BadRequest("file field without a file name".into())))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| api_error("upload", ServerError::BadRequest(format!("Read error: {e}"))))?;
        if bytes.len() > state.max_upload_bytes {
            return Err(api_error(
                "upload",
                ServerError::PayloadTooLarge {
                    size: bytes.len(),
                    max: state.max_upload_bytes,
                },
            ));
        }
        files.push((name, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(api_error("upload", ServerError::BadRequest("No file provided".into())));
    }

    let mut session = state.session.lock().await;
    let mut loaded = Vec::with_capacity(files.len());
    for (name, bytes) in files {
        log_info(format!("📄 NEW UPLOAD: {} ({} bytes)", name, bytes.len()));
        let format = TableFormat::from_file_name(&name)
            .map_err(|e| api_error("upload", TableError::from(e)))?;
        session
            .load(&name, &bytes, format)
            .map_err(|e| api_error("upload", e))?;
        loaded.push(name);
    }

    Ok(Json(json!({
        "status": "ok",
        "loaded": loaded,
        "datasets": session.list_datasets(),
    })))
}

async fn get_dataset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(preview): Query<PreviewQuery>,
) -> Result<Json<Value>, ApiError> {
    let session = state.session.lock().await;
    let table = session.get_table(&id).map_err(|e| api_error("get_table", e))?;
    let history = session.history(&id).map_err(|e| api_error("get_table", e))?;
    Ok(Json(dataset_response(&id, table, history, preview.limit())))
}

/// Run one session edit and answer with the dataset's new state.
async fn edit_dataset<F>(
    state: &AppState,
    id: &str,
    operation: &str,
    rows: usize,
    edit: F,
) -> Result<Json<Value>, ApiError>
where
    F: FnOnce(&mut Session) -> Result<(), TableError>,
{
    let mut session = state.session.lock().await;
    edit(&mut session).map_err(|e| api_error(operation, e))?;
    let table = session.get_table(id).map_err(|e| api_error(operation, e))?;
    let history = session.history(id).map_err(|e| api_error(operation, e))?;
    Ok(Json(dataset_response(id, table, history, rows)))
}

async fn apply_transform(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(preview): Query<PreviewQuery>,
    Json(transform): Json<Transform>,
) -> Result<Json<Value>, ApiError> {
    edit_dataset(&state, &id, transform.name(), preview.limit(), |session| {
        session.apply_transform(&id, &transform).map(|_| ())
    })
    .await
}

async fn drop_columns(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(preview): Query<PreviewQuery>,
    Json(request): Json<ColumnsRequest>,
) -> Result<Json<Value>, ApiError> {
    edit_dataset(&state, &id, "drop_columns", preview.limit(), |session| {
        session.drop_columns(&id, &request.names).map(|_| ())
    })
    .await
}

async fn restore_columns(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(preview): Query<PreviewQuery>,
    Json(request): Json<ColumnsRequest>,
) -> Result<Json<Value>, ApiError> {
    edit_dataset(&state, &id, "restore_columns", preview.limit(), |session| {
        session.restore_columns(&id, &request.names).map(|_| ())
    })
    .await
}

async fn drop_rows(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(preview): Query<PreviewQuery>,
    Json(request): Json<RowsRequest>,
) -> Result<Json<Value>, ApiError> {
    edit_dataset(&state, &id, "drop_rows", preview.limit(), |session| {
        session.drop_rows(&id, &request.keys).map(|_| ())
    })
    .await
}

async fn restore_rows(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(preview): Query<PreviewQuery>,
    Json(request): Json<RowsRequest>,
) -> Result<Json<Value>, ApiError> {
    edit_dataset(&state, &id, "restore_rows", preview.limit(), |session| {
        session.restore_rows(&id, &request.keys).map(|_| ())
    })
    .await
}

async fn export_dataset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let session = state.session.lock().await;
    let table = session.get_table(&id).map_err(|e| api_error("export", e))?;
    let stem = id.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(&id);
    download(table, &format!("{stem}_cleaned"), query.format)
}

// =============================================================================
// Combine
// =============================================================================

/// Combine every dataset and apply the post-combine transforms, all or nothing.
fn run_combine(session: &mut Session, request: &CombineRequest) -> Result<(), ApiError> {
    session
        .combine_with(&request.combine, &request.transforms)
        .map(|_| ())
        .map_err(|e| api_error("combine", e))
}

async fn combine_datasets(
    State(state): State<AppState>,
    Query(preview): Query<PreviewQuery>,
    Json(request): Json<CombineRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut session = state.session.lock().await;
    run_combine(&mut session, &request)?;
    let combined = session
        .combined()
        .ok_or_else(|| api_error("combine", TableError::UnknownDataset(COMBINED_ID.into())))?;
    Ok(Json(combined_response(&combined.mode, &combined.table, preview.limit())))
}

async fn export_combined(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
    Json(request): Json<CombineRequest>,
) -> Result<Response, ApiError> {
    let mut session = state.session.lock().await;
    run_combine(&mut session, &request)?;
    let combined = session
        .combined()
        .ok_or_else(|| api_error("export", TableError::UnknownDataset(COMBINED_ID.into())))?;
    download(&combined.table, "combined_cleaned", query.format)
}

async fn transform_combined(
    State(state): State<AppState>,
    Query(preview): Query<PreviewQuery>,
    Json(transform): Json<Transform>,
) -> Result<Json<Value>, ApiError> {
    let mut session = state.session.lock().await;
    session
        .transform_combined(&transform)
        .map_err(|e| api_error(transform.name(), e))?;
    let combined = session
        .combined()
        .ok_or_else(|| api_error(transform.name(), TableError::UnknownDataset(COMBINED_ID.into())))?;
    Ok(Json(combined_response(&combined.mode, &combined.table, preview.limit())))
}

/// Serialize a table as a file download.
fn download(table: &Table, stem: &str, format: ExportFormat) -> Result<Response, ApiError> {
    let bytes = export(table, format).map_err(|e| api_error("export", e))?;
    let disposition = format!("attachment; filename=\"{stem}.{}\"", format.extension());
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(files: &[(&str, &str)]) -> AppState {
        let state = AppState::new(&ServerConfig::default());
        let mut session = state.session.try_lock().unwrap();
        for (id, content) in files {
            session.load(id, content.as_bytes(), TableFormat::Delimited).unwrap();
        }
        drop(session);
        state
    }

    #[tokio::test]
    async fn test_get_dataset_and_unknown() {
        let state = state_with(&[("a.csv", "id,v\n1,10\n2,20\n")]);

        let Json(body) = get_dataset(
            State(state.clone()),
            Path("a.csv".to_string()),
            Query(PreviewQuery::default()),
        )
        .await
        .unwrap();
        assert_eq!(body["table"]["columns"], json!(["id", "v"]));

        let (status, Json(body)) = get_dataset(
            State(state),
            Path("nope.csv".to_string()),
            Query(PreviewQuery::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "UnknownDataset");
    }

    #[tokio::test]
    async fn test_drop_and_restore_columns() {
        let state = state_with(&[("a.csv", "id,v\n1,10\n2,20\n")]);
        let request = ColumnsRequest { names: vec!["v".into()] };

        let Json(body) = drop_columns(
            State(state.clone()),
            Path("a.csv".to_string()),
            Query(PreviewQuery::default()),
            Json(request.clone()),
        )
        .await
        .unwrap();
        assert_eq!(body["table"]["columns"], json!(["id"]));
        assert_eq!(body["history"]["droppedColumns"], json!(["v"]));

        let Json(body) = restore_columns(
            State(state),
            Path("a.csv".to_string()),
            Query(PreviewQuery::default()),
            Json(request),
        )
        .await
        .unwrap();
        assert_eq!(body["table"]["columns"], json!(["id", "v"]));
    }

    #[tokio::test]
    async fn test_transform_error_is_unprocessable() {
        let state = state_with(&[("a.csv", "id\n1\n1\n")]);
        let (status, Json(body)) = apply_transform(
            State(state),
            Path("a.csv".to_string()),
            Query(PreviewQuery::default()),
            Json(Transform::SetIndex { column: "id".into() }),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["operation"], "set_index");
        assert_eq!(body["kind"], "DuplicateIndexError");
    }

    #[tokio::test]
    async fn test_combine_endpoint() {
        let state = state_with(&[("a.csv", "id,v\n1,10\n"), ("b.csv", "id,w\n1,x\n")]);
        let request: CombineRequest = serde_json::from_value(json!({
            "combine": {"mode": "merge", "key": "id"}
        }))
        .unwrap();

        let Json(body) = combine_datasets(
            State(state),
            Query(PreviewQuery::default()),
            Json(request),
        )
        .await
        .unwrap();
        assert_eq!(body["mode"]["mode"], "merge");
        assert_eq!(body["table"]["columns"], json!(["id", "v", "w"]));
    }

    #[tokio::test]
    async fn test_failed_combine_keeps_previous_combined_table() {
        let state = state_with(&[("a.csv", "id,v\n1,10\n2,20\n"), ("b.csv", "id,w\n2,x\n3,y\n")]);
        let concatenate: CombineRequest =
            serde_json::from_value(json!({"combine": {"mode": "concatenate"}})).unwrap();
        combine_datasets(State(state.clone()), Query(PreviewQuery::default()), Json(concatenate))
            .await
            .unwrap();

        let failing: CombineRequest = serde_json::from_value(json!({
            "combine": {"mode": "merge", "key": "id"},
            "transforms": [
                {"type": "filter", "column": "w", "contains": "x"},
                {"type": "sort", "column": "nope"}
            ]
        }))
        .unwrap();
        let (status, Json(body)) =
            combine_datasets(State(state.clone()), Query(PreviewQuery::default()), Json(failing))
                .await
                .unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "ColumnNotFound");

        let session = state.session.lock().await;
        let combined = session.combined().unwrap();
        assert_eq!(combined.table.num_rows(), 4);
        assert_eq!(combined.mode, crate::combine::CombineMode::Concatenate);
    }

    #[tokio::test]
    async fn test_transform_combined_endpoint() {
        let state = state_with(&[("a.csv", "id,v\n1,10\n"), ("b.csv", "id,v\n1,10\n2,20\n")]);
        let (status, _) = transform_combined(
            State(state.clone()),
            Query(PreviewQuery::default()),
            Json(Transform::Deduplicate),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let concatenate: CombineRequest =
            serde_json::from_value(json!({"combine": {"mode": "concatenate"}})).unwrap();
        combine_datasets(State(state.clone()), Query(PreviewQuery::default()), Json(concatenate))
            .await
            .unwrap();
        let Json(body) = transform_combined(
            State(state),
            Query(PreviewQuery::default()),
            Json(Transform::Deduplicate),
        )
        .await
        .unwrap();
        assert_eq!(body["table"]["totalRows"], 2);
    }

    #[tokio::test]
    async fn test_export_csv_download() {
        let state = state_with(&[("a.csv", "id,v\n1,10\n")]);
        let response = export_dataset(
            State(state),
            Path("a.csv".to_string()),
            Query(ExportQuery { format: ExportFormat::Csv }),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"a_cleaned.csv\""
        );
    }
}

//! HTTP API server.
//!
//! Exposes the ingestion pipeline, the employee store, and the query agent as
//! a JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/` | Liveness marker |
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/connect-source` | Mark a registered source as connected |
//! | `DELETE` | `/disconnect-source` | Remove a connected-source marker |
//! | `GET`    | `/list-connected-sources` | Current connected-source markers |
//! | `GET`    | `/get-data` | Sync every connected source and return the batch |
//! | `GET`    | `/normalised-data` | Normalize every registered source (no writes) |
//! | `GET`    | `/field-mapping/{source}` | Inferred mapping for one source |
//! | `GET`    | `/source-schema/{source}` | Field names and one sample record |
//! | `DELETE` | `/sources/{name}` | Unregister a loader |
//! | `POST`   | `/upload-csv` | Register a CSV source and import its rows |
//! | `GET`    | `/employees` | Every persisted employee row |
//! | `POST`   | `/ask` | Answer a natural-language question |
//! | `GET`    | `/logs` | Most recent answered questions, newest first |
//! | `GET`    | `/stats` | Aggregate employee counts |
//!
//! # Error Contract
//!
//! All error responses share one shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `mapping_failed` (500),
//! `database_error` (500), `internal` (500), `upstream_error` (502),
//! `agent_error` (502), `timeout` (504).
//!
//! # Shared state
//!
//! The loader registry and the connected-source list are process-wide and
//! guarded by `tokio::sync::RwLock`. Handlers clone the loader handles they
//! need and release the lock before any I/O or model call.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::agent::{QueryAgent, SqlQueryAgent};
use crate::config::Config;
use crate::db;
use crate::error::Error;
use crate::ingest;
use crate::llm::create_model;
use crate::loader_csv::CsvLoader;
use crate::loaders::{sample_fields, LoaderRegistry, SourceLoader};
use crate::mapper::FieldMapper;
use crate::migrate;
use crate::models::UnifiedEmployee;
use crate::query_log;
use crate::sources::{ConnectOutcome, ConnectedSource, ConnectedSources};
use crate::stats;
use crate::store;

/// Content types accepted by `/upload-csv`, compared without parameters.
const CSV_CONTENT_TYPES: [&str; 2] = ["text/csv", "application/csv"];

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub loaders: Arc<RwLock<LoaderRegistry>>,
    pub connected: Arc<RwLock<ConnectedSources>>,
    pub mapper: Arc<FieldMapper>,
    pub agent: Arc<dyn QueryAgent>,
}

impl AppState {
    pub fn new(
        config: Config,
        pool: SqlitePool,
        loaders: LoaderRegistry,
        mapper: FieldMapper,
        agent: Arc<dyn QueryAgent>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            pool,
            loaders: Arc::new(RwLock::new(loaders)),
            connected: Arc::new(RwLock::new(ConnectedSources::new())),
            mapper: Arc::new(mapper),
            agent,
        }
    }

    /// Open the database and wire the configured model into the mapper and
    /// the query agent.
    pub async fn from_config(config: &Config) -> crate::error::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;

        let model = create_model(&config.llm)?;
        let mapper = FieldMapper::from_config(&config.mapping, model.clone())?;
        let agent = SqlQueryAgent::new(model, pool.clone(), config.agent.max_rows);

        Ok(Self::new(
            config.clone(),
            pool,
            LoaderRegistry::from_config(config),
            mapper,
            Arc::new(agent),
        ))
    }

    async fn loader(&self, name: &str) -> Result<Arc<dyn SourceLoader>, AppError> {
        self.loaders
            .read()
            .await
            .get(name)
            .ok_or_else(|| not_found(format!("source not registered: {}", name)))
    }

    /// Loaders for every connected source still present in the registry.
    async fn connected_loaders(&self) -> Vec<Arc<dyn SourceLoader>> {
        let names = self.connected.read().await.names();
        let registry = self.loaders.read().await;
        names.iter().filter_map(|n| registry.get(n)).collect()
    }
}

/// Build the router with tracing and permissive CORS.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/connect-source", post(handle_connect_source))
        .route("/disconnect-source", delete(handle_disconnect_source))
        .route("/list-connected-sources", get(handle_list_connected))
        .route("/get-data", get(handle_get_data))
        .route("/normalised-data", get(handle_normalised_data))
        .route("/field-mapping/{source}", get(handle_field_mapping))
        .route("/source-schema/{source}", get(handle_source_schema))
        .route("/sources/{name}", delete(handle_remove_source))
        .route("/upload-csv", post(handle_upload_csv))
        .route("/employees", get(handle_employees))
        .route("/ask", post(handle_ask))
        .route("/logs", get(handle_logs))
        .route("/stats", get(handle_stats))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until Ctrl+C or
/// SIGTERM.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let pool = state.pool.clone();
    let app = build_router(state);

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "SyncHub server listening");
    println!("SyncHub server listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = %self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) | Error::Csv(_) => StatusCode::BAD_REQUEST,
            Error::Upstream(_) | Error::Agent(_) => StatusCode::BAD_GATEWAY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Mapping(_) | Error::Database(_) | Error::Io(_) | Error::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ============ GET / and /health ============

async fn handle_root() -> Json<Value> {
    Json(json!({ "message": "SyncHub API is alive!" }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Connected sources ============

#[derive(Deserialize)]
struct SourceRequest {
    name: String,
}

#[derive(Serialize)]
struct ConnectedListResponse {
    connected_sources: Vec<ConnectedSource>,
}

/// Handler for `POST /connect-source`.
///
/// Connecting an already-connected source is not an error; the response
/// message says so.
async fn handle_connect_source(
    State(state): State<AppState>,
    Json(req): Json<SourceRequest>,
) -> Result<Json<Value>, AppError> {
    state.loader(&req.name).await?;

    let mut connected = state.connected.write().await;
    let message = match connected.connect(&req.name) {
        ConnectOutcome::Connected => {
            info!(source = %req.name, "source connected");
            format!("Connected to {}", req.name)
        }
        ConnectOutcome::AlreadyConnected => format!("{} is already connected", req.name),
    };

    Ok(Json(json!({
        "message": message,
        "connected_sources": connected.names(),
    })))
}

/// Handler for `DELETE /disconnect-source`. 404 when the source was not connected.
async fn handle_disconnect_source(
    State(state): State<AppState>,
    Json(req): Json<SourceRequest>,
) -> Result<Json<Value>, AppError> {
    let mut connected = state.connected.write().await;
    connected.disconnect(&req.name)?;
    info!(source = %req.name, "source disconnected");

    Ok(Json(json!({
        "message": format!("Disconnected {}", req.name),
        "connected_sources": connected.names(),
    })))
}

async fn handle_list_connected(State(state): State<AppState>) -> Json<ConnectedListResponse> {
    Json(ConnectedListResponse {
        connected_sources: state.connected.read().await.list().to_vec(),
    })
}

// ============ Pipeline ============

#[derive(Serialize)]
struct DataResponse {
    data: Vec<UnifiedEmployee>,
    connected_sources: Vec<String>,
}

/// Handler for `GET /get-data`.
///
/// Syncs every connected source. All employees are written in one
/// transaction; a commit failure fails the whole call.
async fn handle_get_data(State(state): State<AppState>) -> Result<Json<DataResponse>, AppError> {
    let loaders = state.connected_loaders().await;
    let batches = ingest::sync_sources(&state.pool, &loaders, &state.mapper).await?;

    Ok(Json(DataResponse {
        data: batches.into_iter().flat_map(|b| b.employees).collect(),
        connected_sources: state.connected.read().await.names(),
    }))
}

/// Handler for `GET /normalised-data`. Covers every registered source and
/// writes nothing.
async fn handle_normalised_data(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let loaders = state.loaders.read().await.all();
    let batches = ingest::normalize_sources(&loaders, &state.mapper).await?;

    let skipped: usize = batches.iter().map(|b| b.skipped()).sum();
    let data: Vec<UnifiedEmployee> = batches.into_iter().flat_map(|b| b.employees).collect();

    Ok(Json(json!({
        "count": data.len(),
        "skipped": skipped,
        "data": data,
    })))
}

/// Handler for `GET /field-mapping/{source}`.
async fn handle_field_mapping(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> Result<Json<Value>, AppError> {
    let loader = state.loader(&source).await?;
    let records = loader.load().await?;
    let fields = sample_fields(&records);
    if fields.is_empty() {
        return Err(bad_request(format!("source has no records to map: {}", source)));
    }

    let mapping = state.mapper.infer_mapping(&source, &fields).await?;
    Ok(Json(json!({ "source": source, "mapping": mapping })))
}

/// Handler for `GET /source-schema/{source}`.
async fn handle_source_schema(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> Result<Json<Value>, AppError> {
    let loader = state.loader(&source).await?;
    let records = loader.load().await?;

    Ok(Json(json!({
        "source": source,
        "fields": sample_fields(&records),
        "sample": records.first(),
    })))
}

/// Handler for `DELETE /sources/{name}`. Also drops the connected marker.
async fn handle_remove_source(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, AppError> {
    state
        .loaders
        .write()
        .await
        .remove(&name)
        .ok_or_else(|| not_found(format!("source not registered: {}", name)))?;

    let mut connected = state.connected.write().await;
    if connected.is_connected(&name) {
        connected.disconnect(&name)?;
    }

    Ok(Json(json!({ "message": format!("Removed source {}", name) })))
}

// ============ POST /upload-csv ============

/// Handler for `POST /upload-csv` (`multipart/form-data` with `source_name`
/// and `file`).
///
/// The CSV is parsed before anything is registered, so a rejected upload
/// leaves no loader behind. A valid upload replaces any loader of the same
/// name, then its rows are mapped by header and upserted.
async fn handle_upload_csv(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, AppError> {
    let mut multipart = multipart.map_err(|e| bad_request(e.body_text()))?;

    let mut source_name: Option<String> = None;
    let mut file: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "source_name" => {
                let text = field.text().await.map_err(|e| bad_request(e.body_text()))?;
                source_name = Some(text.trim().to_string());
            }
            "file" => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| bad_request(e.body_text()))?;
                file = Some((content_type, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let source_name = source_name
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request("source_name is required"))?;
    let (content_type, bytes) = file.ok_or_else(|| bad_request("file is required"))?;

    if !is_csv_content_type(content_type.as_deref()) {
        return Err(bad_request("Only CSV files are allowed"));
    }

    let loader = CsvLoader::from_csv(source_name.as_str(), &bytes)?;
    let rows = loader.len();
    let csv_snapshot = loader.clone();
    state.loaders.write().await.register(loader);
    info!(source = %source_name, rows, "CSV source registered");

    let report = ingest::import_csv(&state.pool, &csv_snapshot, &state.mapper).await?;

    Ok(Json(json!({
        "message": format!("Imported {} rows from {}", report.rows, report.source),
        "source": report.source,
        "rows_processed": report.rows,
        "upserted": report.upserted,
        "skipped": report.skipped,
        "mapping": report.mapping,
    })))
}

fn is_csv_content_type(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else {
        return false;
    };
    let essence = ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    CSV_CONTENT_TYPES.contains(&essence.as_str())
}

// ============ Employees, ask, logs, stats ============

async fn handle_employees(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let employees = store::list_employees(&state.pool).await?;
    Ok(Json(json!({ "employees": employees })))
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    question: String,
    answer: String,
}

/// Handler for `POST /ask`.
///
/// Only successful answers are written to the query log; an agent failure
/// returns an error response and logs nothing.
async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let answer = state.agent.ask(question).await?;
    query_log::append(&state.pool, question, &answer).await?;

    Ok(Json(AskResponse {
        question: question.to_string(),
        answer,
    }))
}

async fn handle_logs(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let logs = query_log::recent(&state.pool, state.config.logs.page_size).await?;
    Ok(Json(json!({ "logs": logs })))
}

/// Handler for `GET /stats`. `by_source` covers connected sources only.
async fn handle_stats(State(state): State<AppState>) -> Result<Json<stats::StatsReport>, AppError> {
    let loaders = state.connected_loaders().await;
    let report = stats::collect_stats(&state.pool, &loaders).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_content_type_ignores_parameters() {
        assert!(is_csv_content_type(Some("text/csv")));
        assert!(is_csv_content_type(Some("text/csv; charset=utf-8")));
        assert!(is_csv_content_type(Some("Application/CSV")));
        assert!(!is_csv_content_type(Some("application/json")));
        assert!(!is_csv_content_type(None));
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::Validation("x".into()), StatusCode::BAD_REQUEST),
            (Error::Mapping("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::Agent("x".into()), StatusCode::BAD_GATEWAY),
            (Error::Timeout(3), StatusCode::GATEWAY_TIMEOUT),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }
}

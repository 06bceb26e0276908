//!
//! masterdata HTTP server
//! ----------------------
//! Axum router over `CrudService`. Handlers only translate between HTTP and the
//! service: query-string and body parsing on the way in, status code and JSON
//! envelope on the way out. Every error body is `{ "error": <message> }`.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::FutureExt; // for catch_unwind on async blocks
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, MemoryBackend, PostgresBackend};
use crate::config::ServerConfig;
use crate::crud::{CrudService, ListParams, DEFAULT_LIMIT, DEFAULT_OFFSET};
use crate::error::{AppError, AppResult};
use crate::value::{row_from_json_object, Row};

pub const BODY_NOT_OBJECT_MESSAGE: &str = "Request body must be a JSON object";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CrudService>,
}

impl AppState {
    pub fn new(service: CrudService) -> Self {
        Self { service: Arc::new(service) }
    }
}

/// Query string shared by `/data` and `/schema`. Everything arrives as text;
/// numeric fields are parsed by the handlers so failures map to our own 400s.
#[derive(Debug, Default, Deserialize)]
pub struct DataQuery {
    pub table: Option<String>,
    pub id: Option<String>,
    pub search: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/tables", get(list_tables))
        .route("/data", get(get_data).post(post_data).put(put_data).delete(delete_data))
        .route("/schema", get(get_schema));
    Router::new()
        .route("/", get(|| async { "masterdata ok" }))
        .merge(routes.clone())
        .nest("/api", routes)
        .with_state(state)
}

pub async fn run_with_config(config: ServerConfig) -> anyhow::Result<()> {
    let registry = Arc::new(config.registry());
    let backend: Arc<dyn Backend> = if config.in_memory {
        info!(target: "startup", "using in-memory backend with demo data");
        Arc::new(MemoryBackend::demo())
    } else {
        let settings = config.pool_settings().context("a database URL is required without --in-memory")?;
        Arc::new(PostgresBackend::connect(&settings)?)
    };
    info!(target: "startup", backend = backend.name(), tables = registry.len(), "whitelist loaded");

    let app = router(AppState::new(CrudService::new(registry, backend.clone())));
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", addr))?;
    info!(target: "startup", "Starting server on {}", listener.local_addr()?);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    backend.close();
    info!(target: "startup", "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target: "startup", "ctrl-c received, shutting down"),
        Err(e) => {
            warn!(target: "startup", "cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Run a handler body, converting errors and panics into JSON error responses.
async fn guarded<F>(route: &'static str, fut: F) -> Response
where
    F: Future<Output = AppResult<Response>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            debug!(target: "http", route, status = e.http_status(), "{}", e);
            e.into_response()
        }
        Err(panic_payload) => {
            let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() { *s }
                      else if let Some(s) = panic_payload.downcast_ref::<String>() { s.as_str() }
                      else { "panic" };
            error!(target: "http", route, "handler panic: {}", msg);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal server error" }))).into_response()
        }
    }
}

async fn list_tables(State(state): State<AppState>) -> Response {
    let tables: Vec<&str> = state.service.registry().names().collect();
    Json(json!({ "tables": tables })).into_response()
}

async fn get_data(State(state): State<AppState>, Query(q): Query<DataQuery>) -> Response {
    guarded("GET /data", async move {
        let params = ListParams {
            search: q.search.filter(|s| !s.is_empty()),
            limit: parse_paging(q.limit.as_deref(), DEFAULT_LIMIT, "invalid_limit", "Invalid limit")?,
            offset: parse_paging(q.offset.as_deref(), DEFAULT_OFFSET, "invalid_offset", "Invalid offset")?,
        };
        let page = state.service.list(q.table.as_deref(), &params).await?;
        Ok(Json(page).into_response())
    })
    .await
}

async fn post_data(State(state): State<AppState>, Query(q): Query<DataQuery>, body: Bytes) -> Response {
    guarded("POST /data", async move {
        let values = parse_body(&body)?;
        let row = state.service.create(q.table.as_deref(), &values).await?;
        Ok(Json(json!({ "success": true, "data": row })).into_response())
    })
    .await
}

async fn put_data(State(state): State<AppState>, Query(q): Query<DataQuery>, body: Bytes) -> Response {
    guarded("PUT /data", async move {
        let values = parse_body(&body)?;
        let row = state.service.update(q.table.as_deref(), q.id.as_deref(), &values).await?;
        Ok(Json(json!({ "success": true, "data": row })).into_response())
    })
    .await
}

async fn delete_data(State(state): State<AppState>, Query(q): Query<DataQuery>) -> Response {
    guarded("DELETE /data", async move {
        state.service.delete(q.table.as_deref(), q.id.as_deref()).await?;
        Ok(Json(json!({ "success": true })).into_response())
    })
    .await
}

async fn get_schema(State(state): State<AppState>, Query(q): Query<DataQuery>) -> Response {
    guarded("GET /schema", async move {
        let columns = state.service.schema(q.table.as_deref()).await?;
        Ok(Json(json!({ "columns": columns })).into_response())
    })
    .await
}

/// Absent or blank means the default; anything else must be an integer.
fn parse_paging(raw: Option<&str>, default: i64, code: &str, message: &str) -> AppResult<i64> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(s) => s.parse::<i64>().map_err(|_| AppError::validation(code, message)),
    }
}

/// An empty body counts as an empty column map; the service rejects it.
fn parse_body(body: &[u8]) -> AppResult<Row> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Row::new());
    }
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => Ok(row_from_json_object(map)),
        _ => Err(AppError::validation("invalid_body", BODY_NOT_OBJECT_MESSAGE)),
    }
}

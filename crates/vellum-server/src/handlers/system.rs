//! Cache administration endpoints under `/api/system`.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, Uri, header};
use axum::response::IntoResponse;
use serde::Deserialize;
use vellum_cache::{DeletedEntry, EntryKind, EntryRef, FileStatusInfo};
use vellum_storage::Role;

use crate::error::ServerError;
use crate::handlers::{api_request, blocking};
use crate::state::AppState;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct HashQuery {
    /// Compare content hashes, not only sizes.
    hash: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileQuery {
    #[serde(rename = "type")]
    kind: EntryKind,
    file: String,
}

/// Handle GET /api/system/cache/status.
pub(crate) async fn cache_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashQuery>,
) -> Result<Json<Vec<FileStatusInfo>>, ServerError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let status = blocking(move || orchestrator.list_generated_files_status(query.hash)).await?;
    Ok(Json(status))
}

/// Handle DELETE /api/system/cache/all.
pub(crate) async fn delete_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ServerError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let failed = blocking(move || orchestrator.delete_all()).await?;
    tracing::info!("Cache cleared, {} failure(s)", failed.len());
    Ok(Json(failed))
}

/// Handle DELETE /api/system/cache/file.
pub(crate) async fn delete_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FileQuery>,
) -> Result<Json<bool>, ServerError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let deleted = blocking(move || orchestrator.delete_file(query.kind, &query.file)).await?;
    Ok(Json(deleted))
}

/// Handle DELETE /api/system/cache/files.
pub(crate) async fn delete_files(
    State(state): State<Arc<AppState>>,
    Json(entries): Json<Vec<EntryRef>>,
) -> Result<Json<Vec<EntryRef>>, ServerError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let deleted = blocking(move || orchestrator.delete_files(&entries)).await?;
    Ok(Json(deleted))
}

/// Handle DELETE /api/system/cache/outdated.
pub(crate) async fn delete_outdated(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashQuery>,
) -> Result<Json<Vec<DeletedEntry>>, ServerError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let processed = blocking(move || orchestrator.delete_outdated(query.hash)).await?;
    Ok(Json(processed))
}

/// Handle GET /api/system/config.
pub(crate) async fn config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, TEXT_PLAIN)], state.config_text.clone())
}

/// Handle POST /api/system/path/{role}/update.
pub(crate) async fn update_path(
    Path(role): Path<String>,
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServerError> {
    let role: Role = role
        .parse()
        .map_err(|_| ServerError::BadRequest(format!("unknown role '{role}'")))?;
    let request = api_request(&method, uri.path(), &uri, &headers, &body);
    let orchestrator = Arc::clone(&state.orchestrator);
    let message = blocking(move || orchestrator.update_role(role, &request)).await??;
    Ok(([(header::CONTENT_TYPE, TEXT_PLAIN)], message))
}

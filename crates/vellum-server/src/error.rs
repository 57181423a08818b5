//! Error types for the HTTP server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use vellum_cache::CacheError;
use vellum_proxy::ProxyError;
use vellum_storage::StorageError;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Nothing resolves at the requested path.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The path resolved but generating or copying its source failed.
    #[error("Source missing for {0}")]
    SourceMissing(String),

    /// The global request guard rejected the request.
    #[error("Request rejected")]
    Rejected,

    /// Malformed request parameters.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Cache operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Proxy rule failed.
    #[error("Api failed: {0}")]
    Api(#[from] ProxyError),

    /// Backend construction or access failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A blocking task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::SourceMissing(_) => StatusCode::BAD_GATEWAY,
            Self::Rejected => return StatusCode::FORBIDDEN.into_response(),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Cache(CacheError::NoUpdateCommand(_)) => StatusCode::NOT_IMPLEMENTED,
            Self::Cache(_) | Self::Api(_) | Self::Storage(_) | Self::Task(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = match &self {
            Self::NotFound(path) => json!({"error": "Not found", "path": path}),
            Self::SourceMissing(path) => json!({"error": "Source missing", "path": path}),
            other => json!({"error": other.to_string()}),
        };

        (status, axum::Json(body)).into_response()
    }
}

//! Public file serving.
//!
//! Serves cached artifacts and fills the cache on a miss: pages are
//! generated, assets are copied. Extensionless paths retry as
//! `{path}/index.html` and then `{path}.html`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::{self, HeaderName};
use axum::response::{IntoResponse, Response};
use vellum_cache::{Orchestrator, PublicFile, ResourceDescriptor};

use crate::error::ServerError;
use crate::handlers::blocking;
use crate::state::AppState;

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// A public artifact ready to send.
struct Served {
    name: String,
    hit: bool,
    content: Vec<u8>,
}

impl IntoResponse for Served {
    fn into_response(self) -> Response {
        let mime = mime_guess::from_path(&self.name).first_or_octet_stream();
        (
            [
                (header::CONTENT_TYPE, mime.to_string()),
                (X_CACHE, if self.hit { "HIT" } else { "MISS" }.to_owned()),
            ],
            self.content,
        )
            .into_response()
    }
}

/// Handle GET /.
pub(crate) async fn get_root(State(state): State<Arc<AppState>>) -> Result<Response, ServerError> {
    serve(state, String::new()).await
}

/// Handle GET /{*path}.
pub(crate) async fn get_file(
    Path(path): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ServerError> {
    serve(state, path).await
}

async fn serve(state: Arc<AppState>, path: String) -> Result<Response, ServerError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let served = blocking(move || resolve(&orchestrator, &path)).await??;
    Ok(served.into_response())
}

/// Paths tried in order for a request path.
fn candidates(path: &str) -> Vec<String> {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return vec!["index.html".to_owned()];
    }
    let mut candidates = Vec::with_capacity(3);
    if !path.ends_with('/') {
        candidates.push(path.to_owned());
    }
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    if !last_segment.contains('.') {
        let stem = path.trim_end_matches('/');
        candidates.push(format!("{stem}/index.html"));
        candidates.push(format!("{stem}.html"));
    }
    candidates
}

fn resolve(orchestrator: &Orchestrator, path: &str) -> Result<Served, ServerError> {
    for candidate in candidates(path) {
        let resource = orchestrator.check_file(&candidate);
        let hit = match &resource {
            ResourceDescriptor::NotFound { .. } | ResourceDescriptor::ApiProxy { .. } => continue,
            ResourceDescriptor::Unknown { .. } => true,
            ResourceDescriptor::Page { .. } => {
                if !orchestrator.generate_page(&resource) {
                    tracing::warn!("GET /{path} => page {candidate} missing");
                    return Err(ServerError::SourceMissing(candidate));
                }
                false
            }
            ResourceDescriptor::Asset { .. } => {
                if !orchestrator.copy_asset(&resource) {
                    tracing::warn!("GET /{path} => asset {candidate} missing");
                    return Err(ServerError::SourceMissing(candidate));
                }
                false
            }
        };

        let content = match orchestrator.public_file(&resource)? {
            PublicFile::Path(file) => std::fs::read(file)?,
            PublicFile::Content(content) => content,
        };
        if hit {
            tracing::debug!("GET /{path} => served {candidate} from cache");
        } else {
            tracing::info!("GET /{path} => {candidate} cached");
        }
        return Ok(Served {
            name: candidate,
            hit,
            content,
        });
    }

    tracing::debug!("GET /{path} => not found");
    Err(ServerError::NotFound(path.to_owned()))
}

//! Proxy API endpoint.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::HeaderName;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use vellum_cache::{ApiType, Orchestrator, ResourceDescriptor};
use vellum_proxy::{ApiOutcome, ApiRequest};

use crate::error::ServerError;
use crate::handlers::{api_request, blocking};
use crate::state::AppState;

/// Handle any method on /api/proxy/{*path}.
pub(crate) async fn call(
    Path(path): Path<String>,
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServerError> {
    let request = api_request(&method, &path, &uri, &headers, &body);
    let orchestrator = Arc::clone(&state.orchestrator);
    let outcome = blocking(move || execute(&orchestrator, &path, &request)).await??;

    match outcome {
        ApiOutcome::Success {
            status,
            headers,
            body,
        } => {
            let mut response = (StatusCode::from_u16(status).unwrap_or(StatusCode::OK), body)
                .into_response();
            for (name, value) in headers {
                match (
                    HeaderName::try_from(name.as_str()),
                    HeaderValue::try_from(value.as_str()),
                ) {
                    (Ok(name), Ok(value)) => {
                        response.headers_mut().insert(name, value);
                    }
                    _ => tracing::warn!("Dropping invalid response header {name}"),
                }
            }
            Ok(response)
        }
        ApiOutcome::Forbidden => Ok(StatusCode::METHOD_NOT_ALLOWED.into_response()),
        ApiOutcome::Error(e) => Err(ServerError::Api(e)),
    }
}

fn execute(
    orchestrator: &Orchestrator,
    path: &str,
    request: &ApiRequest,
) -> Result<ApiOutcome, ServerError> {
    let api = orchestrator.check_api(ApiType::Proxy, path);
    match &api {
        ResourceDescriptor::ApiProxy { exists: true, .. } => {}
        ResourceDescriptor::ApiProxy { exists: false, .. } => {
            if !orchestrator.copy_api(&api) {
                tracing::warn!("{} /{path} => api missing", request.method);
                return Err(ServerError::SourceMissing(path.to_owned()));
            }
        }
        _ => {
            tracing::debug!("{} /{path} => not found", request.method);
            return Err(ServerError::NotFound(path.to_owned()));
        }
    }
    Ok(orchestrator.execute_api(&api, request))
}

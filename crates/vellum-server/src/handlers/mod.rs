//! HTTP request handlers.

pub(crate) mod files;
pub(crate) mod health;
pub(crate) mod proxy;
pub(crate) mod system;

use axum::extract::Query;
use axum::http::{HeaderMap, Method, Uri};
use vellum_proxy::ApiRequest;

use crate::error::ServerError;

/// Run blocking orchestrator work off the async executor.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, ServerError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await?)
}

/// Convert an incoming HTTP request into the shape rule expressions see.
pub(crate) fn api_request(
    method: &Method,
    path: &str,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> ApiRequest {
    let mut request = ApiRequest::new(method.as_str(), path.trim_start_matches('/'))
        .with_body(String::from_utf8_lossy(body));

    if let Ok(Query(pairs)) = Query::<Vec<(String, String)>>::try_from_uri(uri) {
        for (name, value) in pairs {
            request.query.entry(name).or_default().push(value);
        }
    }
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }
    request
}

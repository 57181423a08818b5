//! Global request guard and response hook.
//!
//! `server.validate_requests` runs before routing; a falsy or failing result
//! answers 403. `server.configure_responses` runs next and whatever status
//! and headers it sets are applied to the routed response.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::header::HeaderName;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use vellum_proxy::{ApiRequest, ResponseParts, shape_response};
use vellum_template::{Evaluator, Scope, Value};

use crate::error::ServerError;
use crate::handlers::{api_request, blocking};
use crate::state::AppState;

/// Largest request body buffered for hook evaluation.
const BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Run the configured hooks around the rest of the stack.
pub(crate) async fn request_hooks(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.has_hooks() {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Cannot buffer request body: {e}");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };
    let api = api_request(
        &parts.method,
        parts.uri.path(),
        &parts.uri,
        &parts.headers,
        &bytes,
    );

    let evaluator = Arc::clone(state.orchestrator.evaluator());
    let validate = state.validate_requests.clone();
    let configure = state.configure_responses.clone();
    let shaped = blocking(move || {
        run_hooks(
            evaluator.as_ref(),
            validate.as_deref(),
            configure.as_deref(),
            &api,
        )
    })
    .await
    .and_then(|result| result);
    let shaped = match shaped {
        Ok(shaped) => shaped,
        Err(e) => return e.into_response(),
    };

    let mut response = next.run(Request::from_parts(parts, Body::from(bytes))).await;
    apply(&mut response, shaped);
    response
}

fn run_hooks(
    evaluator: &dyn Evaluator,
    validate: Option<&str>,
    configure: Option<&str>,
    request: &ApiRequest,
) -> Result<ResponseParts, ServerError> {
    if let Some(expression) = validate {
        let scope = Scope::new().with("request", Value::from_serialize(request));
        match evaluator.evaluate(expression, &scope) {
            Ok(allowed) if allowed.is_true() => {}
            Ok(_) => return Err(ServerError::Rejected),
            Err(e) => {
                tracing::warn!("server.validate_requests failed: {e}");
                return Err(ServerError::Rejected);
            }
        }
    }

    let Some(expression) = configure else {
        return Ok(ResponseParts::default());
    };
    Ok(
        shape_response(evaluator, expression, request).unwrap_or_else(|e| {
            tracing::warn!("server.configure_responses failed: {e}");
            ResponseParts::default()
        }),
    )
}

fn apply(response: &mut Response, shaped: ResponseParts) {
    if let Some(status) = shaped.status.and_then(|s| StatusCode::from_u16(s).ok()) {
        *response.status_mut() = status;
    }
    for (name, value) in shaped.headers {
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
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use vellum_template::JinjaEvaluator;

    use super::*;

    #[test]
    fn test_no_hooks_leave_response_alone() {
        let evaluator = JinjaEvaluator::default();

        let parts = run_hooks(&evaluator, None, None, &ApiRequest::new("GET", "")).unwrap();

        assert_eq!(parts, ResponseParts::default());
    }

    #[test]
    fn test_guard_rejects_falsy_and_failing() {
        let evaluator = JinjaEvaluator::default();
        let request = ApiRequest::new("DELETE", "index.html");

        let falsy = run_hooks(&evaluator, Some("request.method == 'GET'"), None, &request);
        let failing = run_hooks(&evaluator, Some("request.method.nope()"), None, &request);

        assert!(matches!(falsy, Err(ServerError::Rejected)));
        assert!(matches!(failing, Err(ServerError::Rejected)));
    }

    #[test]
    fn test_configure_hook_failure_is_ignored() {
        let evaluator = JinjaEvaluator::default();

        let parts = run_hooks(
            &evaluator,
            Some("true"),
            Some("response.nope()"),
            &ApiRequest::new("GET", ""),
        )
        .unwrap();

        assert_eq!(parts, ResponseParts::default());
    }

    #[test]
    fn test_apply_sets_status_and_headers() {
        let mut response = StatusCode::OK.into_response();
        let shaped = ResponseParts {
            status: Some(202),
            headers: [("X-Frame-Options".to_owned(), "DENY".to_owned())].into(),
        };

        apply(&mut response, shaped);

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()["x-frame-options"], "DENY");
    }
}

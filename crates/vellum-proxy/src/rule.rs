//! Compiled proxy rules and their execution pipeline.

use std::sync::Arc;

use vellum_template::http::{HttpClient, OutboundResponse};
use vellum_template::{Evaluator, Scope, Value, http_value};

use crate::descriptor::ProxyDescriptor;
use crate::error::{ProxyError, Stage};
use crate::request::{ApiRequest, OutboundCallHandle, ResponseHandle, ResponseParts};

/// What a rule needs at execution time.
#[derive(Clone)]
pub struct ProxyContext {
    /// Evaluator running the stages.
    pub evaluator: Arc<dyn Evaluator>,
    /// Client for the outbound call.
    pub client: HttpClient,
    /// Working directory bound as `pwd`.
    pub pwd: String,
}

/// Result of running a rule.
#[derive(Debug)]
pub enum ApiOutcome {
    /// The rule produced a body.
    Success {
        /// Status set by the rule, 200 otherwise.
        status: u16,
        /// Headers set by the rule, plus a JSON content type for structured bodies.
        headers: Vec<(String, String)>,
        /// Response body.
        body: String,
    },
    /// `validateRequest` rejected the request; no outbound call was issued.
    Forbidden,
    /// A stage failed.
    Error(ProxyError),
}

/// Proxy descriptor whose stages parsed successfully.
///
/// Stage sources are kept as text and run through the evaluator on every
/// call; parsing happens once, in [`CompiledRule::compile`].
#[derive(Debug, Clone)]
pub struct CompiledRule {
    descriptor: ProxyDescriptor,
}

impl CompiledRule {
    /// Parse a descriptor and check every stage.
    pub fn compile(source: &str, evaluator: &dyn Evaluator) -> Result<Self, ProxyError> {
        let descriptor = ProxyDescriptor::from_yaml(source)?;

        let expressions = [
            (Stage::Validate, descriptor.validate_request.as_deref()),
            (Stage::ConfigureCall, descriptor.configure_call.as_deref()),
            (Stage::ConfigureResponse, Some(descriptor.configure_response.as_str())),
        ];
        for (stage, source) in expressions {
            if let Some(source) = source {
                evaluator
                    .check_expression(source)
                    .map_err(ProxyError::stage(stage))?;
            }
        }

        let templates = [
            (Stage::MakePayload, descriptor.make_payload.as_deref()),
            (Stage::MakeResponse, descriptor.make_response.as_deref()),
        ];
        for (stage, source) in templates {
            if let Some(source) = source {
                evaluator
                    .check_template(source)
                    .map_err(ProxyError::stage(stage))?;
            }
        }

        Ok(Self { descriptor })
    }

    /// Descriptor this rule was compiled from.
    #[must_use]
    pub fn descriptor(&self) -> &ProxyDescriptor {
        &self.descriptor
    }

    /// Run the pipeline for one request.
    pub fn execute(&self, request: &ApiRequest, ctx: &ProxyContext) -> ApiOutcome {
        let request = Value::from_serialize(request);
        let outbound = Value::from_object(OutboundCallHandle::default());
        let base = Scope::new()
            .with("pwd", Value::from(ctx.pwd.as_str()))
            .with("request", request)
            .with("outbound_call", outbound.clone());

        if let Some(validate) = &self.descriptor.validate_request {
            match ctx.evaluator.evaluate(validate, &base) {
                Ok(allowed) if allowed.is_true() => {}
                Ok(_) => return ApiOutcome::Forbidden,
                Err(e) => {
                    tracing::warn!("{} rejected request: {e}", Stage::Validate);
                    return ApiOutcome::Forbidden;
                }
            }
        }

        match self.run(base, &outbound, ctx) {
            Ok(outcome) => outcome,
            Err(e) => ApiOutcome::Error(e),
        }
    }

    fn run(
        &self,
        base: Scope,
        outbound: &Value,
        ctx: &ProxyContext,
    ) -> Result<ApiOutcome, ProxyError> {
        let result = match &self.descriptor.configure_call {
            Some(configure) => Some(self.call_remote(configure, &base, outbound, ctx)?),
            None => None,
        };

        let response = Value::from_object(ResponseHandle::default());
        let mut scope = base.with("response", response.clone());
        if let Some(result) = &result {
            scope.bind("result", Value::from_serialize(result));
        }

        let configured = ctx
            .evaluator
            .evaluate(&self.descriptor.configure_response, &scope)
            .map_err(ProxyError::stage(Stage::ConfigureResponse))?;
        let (body, is_json) = match &self.descriptor.make_response {
            Some(template) => (
                ctx.evaluator
                    .render(template, &scope, None)
                    .map_err(ProxyError::stage(Stage::MakeResponse))?,
                false,
            ),
            None => body_text(&configured),
        };

        let parts = response
            .downcast_object_ref::<ResponseHandle>()
            .map(ResponseHandle::parts)
            .unwrap_or_default();
        Ok(success(parts, body, is_json))
    }

    /// Let `configureCall` fill in `outbound_call`, then send it.
    ///
    /// The body is the `makePayload` rendering when present, otherwise
    /// whatever `configureCall` evaluated to.
    fn call_remote(
        &self,
        configure: &str,
        scope: &Scope,
        outbound: &Value,
        ctx: &ProxyContext,
    ) -> Result<OutboundResponse, ProxyError> {
        let scope = scope.clone().with("client", http_value(ctx.client.clone()));
        let value = ctx
            .evaluator
            .evaluate(configure, &scope)
            .map_err(ProxyError::stage(Stage::ConfigureCall))?;

        let mut call = outbound
            .downcast_object_ref::<OutboundCallHandle>()
            .map(OutboundCallHandle::call)
            .unwrap_or_default();
        if call.url.is_empty() {
            return Err(ProxyError::InvalidCall("outbound_call.url was never set".to_owned()));
        }

        call.body = match &self.descriptor.make_payload {
            Some(payload) => Some(serde_json::Value::String(
                ctx.evaluator
                    .render(payload, &scope, None)
                    .map_err(ProxyError::stage(Stage::MakePayload))?,
            )),
            None => call_body(&value)?,
        };

        Ok(ctx.client.send(&call)?)
    }
}

/// Outbound body from a `configureCall` value.
///
/// Strings go out verbatim and other values as JSON. Nothing, or the
/// `outbound_call` object itself returned by a setter chain, means no body.
fn call_body(value: &Value) -> Result<Option<serde_json::Value>, ProxyError> {
    if value.is_undefined()
        || value.is_none()
        || value.downcast_object_ref::<OutboundCallHandle>().is_some()
    {
        return Ok(None);
    }
    if let Some(text) = value.as_str() {
        return Ok(Some(serde_json::Value::String(text.to_owned())));
    }
    serde_json::to_value(value)
        .map(Some)
        .map_err(|e| ProxyError::InvalidCall(e.to_string()))
}

/// Text of a response body; structured values become JSON.
fn body_text(value: &Value) -> (String, bool) {
    if value.is_undefined() || value.is_none() {
        return (String::new(), false);
    }
    if let Some(text) = value.as_str() {
        return (text.to_owned(), false);
    }
    match serde_json::to_string(value) {
        Ok(json) => (json, true),
        Err(_) => (value.to_string(), false),
    }
}

fn success(parts: ResponseParts, body: String, is_json: bool) -> ApiOutcome {
    let mut headers: Vec<(String, String)> = parts.headers.into_iter().collect();
    if is_json && !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
        headers.push(("content-type".to_owned(), "application/json".to_owned()));
    }
    ApiOutcome::Success {
        status: parts.status.unwrap_or(200),
        headers,
        body,
    }
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;
    use pretty_assertions::assert_eq;
    use vellum_template::JinjaEvaluator;

    use super::*;

    fn ctx() -> ProxyContext {
        ProxyContext {
            evaluator: Arc::new(JinjaEvaluator::default()),
            client: HttpClient::default(),
            pwd: "/srv".to_owned(),
        }
    }

    fn compile(yaml: &str) -> CompiledRule {
        CompiledRule::compile(yaml, &JinjaEvaluator::default()).unwrap()
    }

    fn body_of(outcome: ApiOutcome) -> String {
        match outcome {
            ApiOutcome::Success { body, .. } => body,
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_rule_without_validate_always_passes() {
        let rule = compile("configureResponse: \"'pong ' ~ request.method\"");

        let outcome = rule.execute(&ApiRequest::new("GET", "ping"), &ctx());

        assert_eq!(body_of(outcome), "pong GET");
    }

    #[test]
    fn test_falsy_validate_is_forbidden_without_call() {
        let rule = compile(
            r#"
validateRequest: request.method == "GET"
configureCall: outbound_call.set_url('http://127.0.0.1:9/never')
configureResponse: result.body
"#,
        );

        let outcome = rule.execute(&ApiRequest::new("POST", "x"), &ctx());

        assert!(matches!(outcome, ApiOutcome::Forbidden));
    }

    #[test]
    fn test_failing_validate_is_forbidden() {
        let rule = compile("validateRequest: json.decode('nope')\nconfigureResponse: \"'x'\"");

        let outcome = rule.execute(&ApiRequest::new("GET", "x"), &ctx());

        assert!(matches!(outcome, ApiOutcome::Forbidden));
    }

    #[test]
    fn test_validate_sees_pwd() {
        let rule = compile("validateRequest: pwd == '/srv'\nconfigureResponse: \"'ok'\"");

        let outcome = rule.execute(&ApiRequest::new("GET", "x"), &ctx());

        assert_eq!(body_of(outcome), "ok");
    }

    #[test]
    fn test_structured_body_is_json() {
        let rule = compile("configureResponse: \"{'a': 1}\"");

        let outcome = rule.execute(&ApiRequest::new("GET", "x"), &ctx());

        match outcome {
            ApiOutcome::Success {
                status,
                headers,
                body,
            } => {
                assert_eq!(status, 200);
                assert_eq!(body, r#"{"a":1}"#);
                assert_eq!(
                    headers,
                    vec![("content-type".to_owned(), "application/json".to_owned())]
                );
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_make_response_replaces_body_and_response_is_shaped() {
        let rule = compile(
            r#"
configureResponse: "'ignored'"
makeResponse: "{{ response.set_status(201) }}{{ response.set_header('X-Rule', 'yes') }}made"
"#,
        );

        let outcome = rule.execute(&ApiRequest::new("GET", "x"), &ctx());

        match outcome {
            ApiOutcome::Success {
                status,
                headers,
                body,
            } => {
                assert_eq!(status, 201);
                assert_eq!(body, "made");
                assert_eq!(headers, vec![("X-Rule".to_owned(), "yes".to_owned())]);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_outbound_call_and_result_binding() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("GET").path("/users");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"results":[{"email":"a@example.com"}]}"#);
        });
        let rule = compile(&format!(
            "configureCall: \"outbound_call.set_url('{}')\"\nconfigureResponse: json.decode(result.body).results[0].email",
            server.url("/users")
        ));

        let outcome = rule.execute(&ApiRequest::new("GET", "users"), &ctx());

        mock.assert();
        assert_eq!(body_of(outcome), "a@example.com");
    }

    #[test]
    fn test_make_payload_sent_verbatim() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST").path("/echo").body("name=vellum");
            then.status(200).body("received");
        });
        let rule = compile(&format!(
            "configureCall: \"outbound_call.open('POST', '{}')\"\nmakePayload: \"name={{{{ request.body }}}}\"\nconfigureResponse: result.status",
            server.url("/echo")
        ));

        let outcome = rule.execute(&ApiRequest::new("POST", "echo").with_body("vellum"), &ctx());

        mock.assert();
        assert_eq!(body_of(outcome), "200");
    }

    #[test]
    fn test_configure_call_value_is_json_payload() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST")
                .path("/users")
                .header("content-type", "application/json")
                .header("x-key", "secret")
                .json_body(serde_json::json!({"name": "vellum", "admin": false}));
            then.status(201).body("created");
        });
        let rule = compile(&format!(
            "configureCall: \"[outbound_call.open('POST', '{}').set_header('X-Key', 'secret'), {{'name': request.body, 'admin': false}}]|last\"\nconfigureResponse: \"outbound_call.method ~ ' ' ~ result.status\"",
            server.url("/users")
        ));

        let outcome = rule.execute(&ApiRequest::new("POST", "users").with_body("vellum"), &ctx());

        mock.assert();
        assert_eq!(body_of(outcome), "POST 201");
    }

    #[test]
    fn test_configure_call_string_value_sent_verbatim() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("PUT").path("/notes").body("plain text");
            then.status(204);
        });
        let rule = compile(&format!(
            "configureCall: \"[outbound_call.open('put', '{}'), 'plain text']|last\"\nconfigureResponse: result.status",
            server.url("/notes")
        ));

        let outcome = rule.execute(&ApiRequest::new("PUT", "notes"), &ctx());

        mock.assert();
        assert_eq!(body_of(outcome), "204");
    }

    #[test]
    fn test_setter_chain_sends_no_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("GET").path("/ping").body("");
            then.status(200).body("pong");
        });
        let rule = compile(&format!(
            "configureCall: \"outbound_call.set_url('{}')\"\nconfigureResponse: result.body",
            server.url("/ping")
        ));

        let outcome = rule.execute(&ApiRequest::new("GET", "ping"), &ctx());

        mock.assert();
        assert_eq!(body_of(outcome), "pong");
    }

    #[test]
    fn test_make_payload_sees_outbound_call() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST").path("/echo").body("to POST");
            then.status(200);
        });
        let rule = compile(&format!(
            "configureCall: \"outbound_call.open('POST', '{}')\"\nmakePayload: \"to {{{{ outbound_call.method }}}}\"\nconfigureResponse: result.status",
            server.url("/echo")
        ));

        let outcome = rule.execute(&ApiRequest::new("POST", "echo"), &ctx());

        mock.assert();
        assert_eq!(body_of(outcome), "200");
    }

    #[test]
    fn test_upstream_failure_is_error() {
        let rule = compile(
            "configureCall: \"outbound_call.set_url('http://127.0.0.1:9/down')\"\nconfigureResponse: result.body",
        );

        let outcome = rule.execute(&ApiRequest::new("GET", "x"), &ctx());

        assert!(matches!(outcome, ApiOutcome::Error(ProxyError::Upstream(_))));
    }

    #[test]
    fn test_call_without_url_is_error() {
        let rule =
            compile("configureCall: outbound_call.set_method('POST')\nconfigureResponse: \"'x'\"");

        let outcome = rule.execute(&ApiRequest::new("GET", "x"), &ctx());

        assert!(matches!(outcome, ApiOutcome::Error(ProxyError::InvalidCall(_))));
    }

    #[test]
    fn test_compile_rejects_bad_stage() {
        let err = CompiledRule::compile(
            "configureResponse: \"1 +\"",
            &JinjaEvaluator::default(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ProxyError::Stage {
                stage: Stage::ConfigureResponse,
                ..
            }
        ));
    }
}

//! Incoming request and response shaping bound into rule scopes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use minijinja::value::{Enumerator, Object, Value, from_args};
use minijinja::{Error, ErrorKind, State};
use serde::Serialize;
use vellum_template::http::OutboundCall;
use vellum_template::{Evaluator, Scope, TemplateError};

/// Incoming request as seen by rule stages (`request` in scope).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApiRequest {
    /// Uppercase HTTP method.
    pub method: String,
    /// API path below the proxy prefix.
    pub path: String,
    /// Query parameters (multi-valued).
    pub query: BTreeMap<String, Vec<String>>,
    /// Request headers with lowercase names (multi-valued).
    pub headers: BTreeMap<String, Vec<String>>,
    /// Body decoded as UTF-8.
    pub body: String,
}

impl ApiRequest {
    /// Create a request without query, headers or body.
    #[must_use]
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_owned(),
            ..Self::default()
        }
    }

    /// Add a header value.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.to_owned());
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

/// Status and headers a rule set on its response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseParts {
    /// Status override.
    pub status: Option<u16>,
    /// Headers to add.
    pub headers: BTreeMap<String, String>,
}

/// Mutable `response` object exposed to the `configureResponse` stage.
#[derive(Debug, Default)]
pub(crate) struct ResponseHandle {
    parts: Mutex<ResponseParts>,
}

impl ResponseHandle {
    pub(crate) fn parts(&self) -> ResponseParts {
        self.parts.lock().unwrap().clone()
    }
}

impl Object for ResponseHandle {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let parts = self.parts.lock().unwrap();
        match key.as_str()? {
            "status" => Some(Value::from(parts.status.unwrap_or(200))),
            "headers" => Some(Value::from_serialize(&parts.headers)),
            _ => None,
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(&["status", "headers"])
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "set_status" => {
                let (status,): (u16,) = from_args(args)?;
                self.parts.lock().unwrap().status = Some(status);
                Ok(Value::UNDEFINED)
            }
            "set_header" => {
                let (name, value): (String, String) = from_args(args)?;
                self.parts.lock().unwrap().headers.insert(name, value);
                Ok(Value::UNDEFINED)
            }
            _ => Err(Error::new(
                ErrorKind::UnknownMethod,
                format!("response has no method named {method}"),
            )),
        }
    }
}

/// Mutable `outbound_call` object filled in by the `configureCall` stage.
///
/// Setters return the object itself so they chain:
/// `outbound_call.open('POST', url).set_header('Accept', 'application/json')`.
#[derive(Debug, Default)]
pub(crate) struct OutboundCallHandle {
    call: Mutex<OutboundCall>,
}

impl OutboundCallHandle {
    pub(crate) fn call(&self) -> OutboundCall {
        self.call.lock().unwrap().clone()
    }
}

impl Object for OutboundCallHandle {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let call = self.call.lock().unwrap();
        match key.as_str()? {
            "method" => Some(Value::from(call.method.as_str())),
            "url" => Some(Value::from(call.url.as_str())),
            "headers" => Some(Value::from_serialize(&call.headers)),
            _ => None,
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(&["method", "url", "headers"])
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "open" => {
                let (method, url): (String, String) = from_args(args)?;
                let mut call = self.call.lock().unwrap();
                call.method = method.to_ascii_uppercase();
                call.url = url;
            }
            "set_method" => {
                let (method,): (String,) = from_args(args)?;
                self.call.lock().unwrap().method = method.to_ascii_uppercase();
            }
            "set_url" => {
                let (url,): (String,) = from_args(args)?;
                self.call.lock().unwrap().url = url;
            }
            "set_header" => {
                let (name, value): (String, String) = from_args(args)?;
                self.call.lock().unwrap().headers.insert(name, value);
            }
            _ => {
                return Err(Error::new(
                    ErrorKind::UnknownMethod,
                    format!("outbound_call has no method named {method}"),
                ));
            }
        }
        Ok(Value::from_dyn_object(Arc::clone(self)))
    }
}

/// Run a response hook expression with `request` and a fresh `response` in scope.
///
/// Returns whatever the expression set through `response.set_status` and
/// `response.set_header`.
pub fn shape_response(
    evaluator: &dyn Evaluator,
    expression: &str,
    request: &ApiRequest,
) -> Result<ResponseParts, TemplateError> {
    let response = Value::from_object(ResponseHandle::default());
    let scope = Scope::new()
        .with("request", Value::from_serialize(request))
        .with("response", response.clone());
    evaluator.evaluate(expression, &scope)?;
    Ok(response
        .downcast_object_ref::<ResponseHandle>()
        .map(ResponseHandle::parts)
        .unwrap_or_default())
}

//! Outbound HTTP calls shared by the `http` builtin and the proxy engine.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ureq::Agent;

/// Default HTTP timeout in seconds.
const DEFAULT_TIMEOUT: u64 = 30;

/// Error from an outbound call.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// Network failure, timeout, or invalid response.
    #[error("HTTP request failed: {0}")]
    Request(#[from] ureq::Error),

    /// Method, URL or header could not be encoded.
    #[error("invalid HTTP request: {0}")]
    Build(#[from] ureq::http::Error),

    /// Payload could not be serialized.
    #[error("invalid HTTP payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Description of a call to issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundCall {
    /// HTTP method (default `GET`).
    #[serde(default = "default_method")]
    pub method: String,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Body: strings are sent verbatim, any other value as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

fn default_method() -> String {
    "GET".to_owned()
}

impl Default for OutboundCall {
    fn default() -> Self {
        Self::new("GET", "")
    }
}

impl OutboundCall {
    /// Create a call without headers or body.
    #[must_use]
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_owned(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Encode the body, returning bytes and whether it was JSON-serialized.
    fn encode_body(&self) -> Result<(Vec<u8>, bool), serde_json::Error> {
        match &self.body {
            None | Some(serde_json::Value::Null) => Ok((Vec::new(), false)),
            Some(serde_json::Value::String(text)) => Ok((text.clone().into_bytes(), false)),
            Some(other) => Ok((serde_json::to_vec(other)?, true)),
        }
    }
}

/// Result of an outbound call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundResponse {
    /// Status code.
    pub status: u16,
    /// Response headers (multi-valued headers joined with `,`).
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
}

/// Blocking HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: Agent,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT))
    }
}

impl HttpClient {
    /// Create a client with a global per-call timeout.
    ///
    /// Error statuses are returned as responses, not errors.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }

    /// Issue a call and read the whole response.
    pub fn send(&self, call: &OutboundCall) -> Result<OutboundResponse, HttpError> {
        let (payload, is_json) = call.encode_body()?;

        let mut builder = ureq::http::Request::builder()
            .method(call.method.as_str())
            .uri(call.url.as_str());
        for (name, value) in &call.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if is_json && !call.headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
            builder = builder.header("Content-Type", "application/json");
        }

        tracing::debug!("{} {}", call.method, call.url);
        let response = if payload.is_empty() {
            self.agent.run(builder.body(())?)?
        } else {
            self.agent.run(builder.body(payload)?)?
        };

        let status = response.status().as_u16();
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_owned())
                .and_modify(|existing| {
                    existing.push(',');
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        let mut body = response.into_body();
        let bytes = body.read_to_vec()?;

        Ok(OutboundResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

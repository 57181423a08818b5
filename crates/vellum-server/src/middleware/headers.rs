//! Identity headers added to every response:
//! - Server
//! - X-Served-By

use axum::http::HeaderValue;
use axum::http::header::{self, HeaderName};
use tower_http::set_header::SetResponseHeaderLayer;

/// `Server` header value.
const SERVER: &str = concat!("vellum/", env!("CARGO_PKG_VERSION"));

/// Create layer that adds the Server header.
pub(crate) fn server_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(header::SERVER, HeaderValue::from_static(SERVER))
}

/// Create layer that adds the X-Served-By header.
///
/// A name that is not a valid header value falls back to `vellum`.
pub(crate) fn served_by_layer(name: &str) -> SetResponseHeaderLayer<HeaderValue> {
    let value = HeaderValue::from_str(name).unwrap_or_else(|_| {
        tracing::warn!("server.name {name:?} is not a valid header value");
        HeaderValue::from_static("vellum")
    });
    SetResponseHeaderLayer::overriding(HeaderName::from_static("x-served-by"), value)
}

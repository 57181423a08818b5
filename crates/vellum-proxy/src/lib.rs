//! Declarative reverse-proxy rules.
//!
//! A proxy descriptor lives in the API sources as YAML and is copied to the
//! Private role before it can run. [`RuleCache`] compiles descriptors from
//! Private on first use and keeps them while they are being used.
//! [`CompiledRule::execute`] runs the stage pipeline:
//!
//! 1. `validateRequest` guards the call. Falsy or failing means
//!    [`ApiOutcome::Forbidden`].
//! 2. `configureCall` fills in the `outbound_call` object and yields the
//!    body, which `makePayload` replaces when present. The call is issued
//!    only when `configureCall` is present.
//! 3. `configureResponse` (or `makeResponse`) produces the body.

mod cache;
mod descriptor;
mod error;
mod request;
mod rule;

pub use cache::RuleCache;
pub use descriptor::ProxyDescriptor;
pub use error::{ProxyError, Stage};
pub use request::{ApiRequest, ResponseParts, shape_response};
pub use rule::{ApiOutcome, CompiledRule, ProxyContext};

/// Private-role prefix of compiled proxy descriptors.
pub const PRIVATE_PREFIX: &str = "api/proxy";

/// API-source prefix of proxy descriptors.
pub const SOURCE_PREFIX: &str = "proxy";

/// Private-role path of the descriptor serving `path`.
#[must_use]
pub fn private_path(path: &str) -> String {
    format!("{PRIVATE_PREFIX}/{}.yml", path.trim_matches('/'))
}

/// API-source path of the descriptor serving `path`.
#[must_use]
pub fn source_path(path: &str) -> String {
    format!("{SOURCE_PREFIX}/{}.yml", path.trim_matches('/'))
}

//! Application state.
//!
//! Shared state for all request handlers.

use std::sync::Arc;

use vellum_cache::Orchestrator;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Cache orchestrator; every call into it blocks.
    pub(crate) orchestrator: Arc<Orchestrator>,
    /// Global request guard expression.
    pub(crate) validate_requests: Option<String>,
    /// Global response hook expression.
    pub(crate) configure_responses: Option<String>,
    /// Effective configuration listing served by `/api/system/config`.
    pub(crate) config_text: String,
    /// Value of the `X-Served-By` header.
    pub(crate) served_by: String,
}

impl AppState {
    /// Check if either global hook is configured.
    #[must_use]
    pub(crate) fn has_hooks(&self) -> bool {
        self.validate_requests.is_some() || self.configure_responses.is_some()
    }
}

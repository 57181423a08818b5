//! Router construction.
//!
//! Builds the axum router with all routes and middleware.

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{any, delete, get, post};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::handlers::{files, health, proxy, system};
use crate::middleware::{headers, hooks};
use crate::state::AppState;

/// Create the application router.
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    let system_routes = Router::new()
        .route("/cache/status", get(system::cache_status))
        .route("/cache/all", delete(system::delete_all))
        .route("/cache/file", delete(system::delete_file))
        .route("/cache/files", delete(system::delete_files))
        .route("/cache/outdated", delete(system::delete_outdated))
        .route("/config", get(system::config))
        .route("/path/{role}/update", post(system::update_path));

    let served_by = headers::served_by_layer(&state.served_by);

    Router::new()
        .nest("/api/system", system_routes)
        .route("/api/proxy/{*path}", any(proxy::call))
        .route("/healthcheck", get(health::healthcheck))
        .route("/metrics", get(health::metrics))
        .route("/", get(files::get_root))
        .route("/{*path}", get(files::get_file))
        .layer(from_fn_with_state(Arc::clone(&state), hooks::request_hooks))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(headers::server_layer())
                .layer(served_by),
        )
        .with_state(state)
}

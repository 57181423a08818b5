//! HTTP server for the Vellum content cache.
//!
//! This crate exposes the cache orchestrator over axum:
//! - `GET /{*path}` serves public files, generating pages and copying assets on a miss
//! - `/api/proxy/{*path}` runs proxy rules for any method
//! - `/api/system/...` lists, purges and updates the cache
//! - `/healthcheck` and `/metrics` report on the storage roles
//!
//! # Quick Start
//!
//! ```ignore
//! use vellum_config::Config;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::load(None, None).unwrap();
//!     vellum_server::run_server(&config).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Client ──HTTP──► axum router (vellum-server)
//!                        │
//!                        ├─► request hooks (validate_requests / configure_responses)
//!                        │
//!                        └─► handlers ──spawn_blocking──► Orchestrator (vellum-cache)
//!                                                            │
//!                                                            └─► PathRegistry (vellum-storage)
//! ```

mod app;
mod error;
mod handlers;
mod middleware;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use vellum_cache::Orchestrator;
use vellum_config::Config;
use vellum_storage::{Clock, PathRegistry, SystemClock};
use vellum_template::JinjaEvaluator;
use vellum_template::http::HttpClient;

pub use error::ServerError;
use state::AppState;

/// How often expired compiled rules are evicted in the background.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Build the orchestrator described by `config`.
///
/// # Errors
///
/// Returns an error if a storage backend rejects its configuration.
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator, ServerError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let paths = PathRegistry::build(&config.roles, &config.base_dir, &clock)?;
    let client = HttpClient::default();
    let evaluator = Arc::new(JinjaEvaluator::new(client.clone()));

    Ok(Orchestrator::new(
        Arc::new(paths),
        evaluator,
        client,
        clock,
        config.base_dir.display().to_string(),
    ))
}

/// Create the router serving `orchestrator` with the server settings of `config`.
#[must_use]
pub fn create_app(orchestrator: Arc<Orchestrator>, config: &Config) -> Router {
    let state = Arc::new(AppState {
        orchestrator,
        validate_requests: config.server.validate_requests.clone(),
        configure_responses: config.server.configure_responses.clone(),
        config_text: config.describe(),
        served_by: config.server.name.clone(),
    });
    app::create_router(state)
}

/// Run the server until Ctrl-C.
///
/// Pending metadata writes are flushed before returning.
///
/// # Errors
///
/// Returns an error if the backends cannot be built or the address cannot be bound.
pub async fn run_server(config: &Config) -> Result<(), ServerError> {
    let orchestrator = Arc::new(build_orchestrator(config)?);
    let app = create_app(Arc::clone(&orchestrator), config);

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    tracing::info!(address = %listener.local_addr()?, "Starting server");

    let sweeper = tokio::spawn(sweep_rules(Arc::clone(&orchestrator)));
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    sweeper.abort();

    orchestrator.flush_metadata();
    Ok(served?)
}

/// Evict expired compiled rules between lazy checks.
async fn sweep_rules(orchestrator: Arc<Orchestrator>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let evicted = orchestrator.rules().sweep();
        if evicted > 0 {
            tracing::debug!("Evicted {evicted} expired rule(s)");
        }
    }
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

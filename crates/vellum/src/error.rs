//! CLI error types.

use vellum_config::ConfigError;
use vellum_server::ServerError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Server(#[from] ServerError),

    /// One or more health checks failed.
    #[error("{0} health check(s) failed")]
    Unhealthy(usize),

    /// Some cached files could not be deleted.
    #[error("{0} file(s) could not be deleted")]
    Clear(usize),
}

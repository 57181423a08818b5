//! Vellum CLI - incremental content cache and declarative API proxy.
//!
//! Provides commands for:
//! - `serve`: Start the HTTP server
//! - `status`: List cached artifacts and their staleness
//! - `clear`: Delete every cached artifact
//! - `health`: Check that the written roles are writable

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{ClearArgs, HealthArgs, ServeArgs, StatusArgs};
use error::CliError;
use output::Output;

/// Vellum - incremental content cache and declarative API proxy.
#[derive(Parser)]
#[command(name = "vellum", version, about)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve(ServeArgs),
    /// List cached artifacts and their staleness.
    Status(StatusArgs),
    /// Delete every cached artifact, sidecar and compiled rule.
    Clear(ClearArgs),
    /// Check that the written roles are writable.
    Health(HealthArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose selects debug, otherwise RUST_LOG or info
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Serve(args) => serve(args),
        Commands::Status(args) => args.execute(),
        Commands::Clear(args) => args.execute(),
        Commands::Health(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}

fn serve(args: ServeArgs) -> Result<(), CliError> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(args.execute())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_status_with_hash() {
        let cli = Cli::try_parse_from(["vellum", "-v", "status", "--hash", "-c", "site.toml"])
            .unwrap();

        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Status(_)));
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli =
            Cli::try_parse_from(["vellum", "serve", "--host", "0.0.0.0", "-p", "9000"]).unwrap();

        assert!(matches!(cli.command, Commands::Serve(_)));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["vellum", "publish"]).is_err());
    }
}

//! `vellum serve` command implementation.

use clap::Args;
use vellum_server::run_server;
use vellum_storage::Role;

use super::ConfigArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.config.load(self.host, self.port)?;

        output.info(&format!(
            "Starting server on {}:{}",
            config.server.host, config.server.port
        ));
        output.info(&format!("Base directory: {}", config.base_dir.display()));
        for role in Role::ALL {
            let role_config = &config.roles[&role];
            output.info(&format!(
                "  {:<10} {:<7} {}",
                role.key(),
                role_config.kind,
                role_config.root
            ));
        }

        run_server(&config).await?;
        output.success("Server stopped");
        Ok(())
    }
}

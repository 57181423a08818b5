//! `vellum clear` command implementation.

use clap::Args;

use super::ConfigArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the clear command.
#[derive(Args)]
pub(crate) struct ClearArgs {
    #[command(flatten)]
    config: ConfigArgs,
}

impl ClearArgs {
    /// Delete every generated artifact, sidecar and compiled rule.
    pub(crate) fn execute(&self) -> Result<(), CliError> {
        let output = Output::new();
        let orchestrator = self.config.orchestrator()?;

        let failed = orchestrator.delete_all();
        if failed.is_empty() {
            output.success("Cache cleared");
            return Ok(());
        }
        for path in &failed {
            output.error(&format!("Could not delete {path}"));
        }
        Err(CliError::Clear(failed.len()))
    }
}

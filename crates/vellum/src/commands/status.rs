//! `vellum status` command implementation.

use clap::Args;

use super::ConfigArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the status command.
#[derive(Args)]
pub(crate) struct StatusArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Compare content hashes, not only sizes.
    #[arg(long)]
    hash: bool,
}

impl StatusArgs {
    /// Print the staleness of every cached artifact.
    pub(crate) fn execute(&self) -> Result<(), CliError> {
        let output = Output::new();
        let orchestrator = self.config.orchestrator()?;

        let entries = orchestrator.list_generated_files_status(self.hash);
        let stale = entries
            .iter()
            .filter(|entry| !entry.status.is_up_to_date())
            .count();
        for entry in &entries {
            output.row(
                entry.status.is_up_to_date(),
                &format!("{:<18} {:<8} {}", entry.status, entry.kind, entry.name),
            );
        }

        if stale == 0 {
            output.success(&format!("{} cached file(s), all up to date", entries.len()));
        } else {
            output.warning(&format!(
                "{} cached file(s), {stale} outdated",
                entries.len()
            ));
        }
        Ok(())
    }
}

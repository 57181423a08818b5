//! `vellum health` command implementation.

use clap::Args;

use super::ConfigArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the health command.
#[derive(Args)]
pub(crate) struct HealthArgs {
    #[command(flatten)]
    config: ConfigArgs,
}

impl HealthArgs {
    /// Probe the writable roles.
    pub(crate) fn execute(&self) -> Result<(), CliError> {
        let output = Output::new();
        let orchestrator = self.config.orchestrator()?;

        let checks = orchestrator.health_check();
        let mut failed = 0;
        for (name, check) in &checks {
            match &check.error {
                None if check.success => output.row(true, &format!("{name:<18} ok")),
                error => {
                    failed += 1;
                    output.row(
                        false,
                        &format!("{name:<18} {}", error.as_deref().unwrap_or("failed")),
                    );
                }
            }
        }

        if failed == 0 {
            Ok(())
        } else {
            Err(CliError::Unhealthy(failed))
        }
    }
}

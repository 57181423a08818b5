//! CLI command implementations.

pub(crate) mod clear;
pub(crate) mod health;
pub(crate) mod serve;
pub(crate) mod status;

use std::path::PathBuf;

use clap::Args;
use vellum_cache::Orchestrator;
use vellum_config::{CliSettings, Config};

use crate::error::CliError;

pub(crate) use clear::ClearArgs;
pub(crate) use health::HealthArgs;
pub(crate) use serve::ServeArgs;
pub(crate) use status::StatusArgs;

/// Configuration flags shared by every command.
#[derive(Args)]
pub(crate) struct ConfigArgs {
    /// Path to configuration file (default: auto-discover vellum.toml).
    #[arg(short, long, env = "VELLUM_CONFIG")]
    config: Option<PathBuf>,

    /// Base directory relative role paths resolve against (overrides config).
    #[arg(short, long)]
    base: Option<PathBuf>,
}

impl ConfigArgs {
    /// Load the configuration, applying `host` and `port` overrides.
    pub(crate) fn load(&self, host: Option<String>, port: Option<u16>) -> Result<Config, CliError> {
        let cli_settings = CliSettings {
            host,
            port,
            base: self.base.clone(),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        match &config.config_path {
            Some(path) => tracing::debug!("Loaded configuration from {}", path.display()),
            None => tracing::debug!("No vellum.toml found, using defaults"),
        }
        Ok(config)
    }

    /// Load the configuration and build an orchestrator over it.
    pub(crate) fn orchestrator(&self) -> Result<Orchestrator, CliError> {
        let config = self.load(None, None)?;
        Ok(vellum_server::build_orchestrator(&config)?)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_load_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vellum.toml");
        std::fs::write(&path, "[server]\nport = 9100\n").unwrap();
        let args = ConfigArgs {
            config: Some(path),
            base: Some(dir.path().join("site")),
        };

        let config = args.load(Some("0.0.0.0".to_owned()), None).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.base_dir, dir.path().join("site"));
    }

    #[test]
    fn test_orchestrator_over_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vellum.toml");
        std::fs::write(&path, "").unwrap();
        let args = ConfigArgs {
            config: Some(path),
            base: None,
        };

        let orchestrator = args.orchestrator().unwrap();

        assert!(orchestrator.list_generated_files_status(false).is_empty());
        assert!(orchestrator.health_check().values().all(|check| check.success));
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let args = ConfigArgs {
            config: Some(PathBuf::from("/nonexistent/vellum.toml")),
            base: None,
        };

        assert!(matches!(args.load(None, None), Err(CliError::Config(_))));
    }
}

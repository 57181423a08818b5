//! Configuration management for Vellum.
//!
//! Parses `vellum.toml` with serde and provides auto-discovery of the file in
//! parent directories. CLI settings can be applied during load via
//! [`CliSettings`].
//!
//! ```toml
//! [server]
//! port = 8080
//!
//! [paths]
//! base = "site"
//!
//! [paths.assets]
//! provider = "rclone"
//! path = "assets"
//! hash = "md5"
//! options = { rclone_remote = "s3:" }
//! ```
//!
//! ## Environment Variable Expansion
//!
//! `${VAR}` and `${VAR:-default}` are expanded in `server.host`,
//! `server.name`, `paths.base`, every role `path` and every role option.

mod expand;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use vellum_storage::{BackendKind, HashAlgorithm, Role, RoleConfig};

/// CLI settings that override configuration file values.
///
/// Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override the base directory relative role roots resolve against.
    pub base: Option<PathBuf>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "vellum.toml";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Role configuration as written in TOML.
    paths: PathsConfigRaw,

    /// Resolved base directory (set after loading).
    #[serde(skip)]
    pub base_dir: PathBuf,
    /// Resolved per-role configuration (set after loading).
    #[serde(skip)]
    pub roles: BTreeMap<Role, RoleConfig>,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Value of the `Server` and `X-Served-By` response headers.
    pub name: String,
    /// Expression every request must satisfy, evaluated against `request`.
    pub validate_requests: Option<String>,
    /// Expression run on every response, evaluated against `request` and `response`.
    pub configure_responses: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            name: "vellum".to_owned(),
            validate_requests: None,
            configure_responses: None,
        }
    }
}

/// Raw `[paths]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct PathsConfigRaw {
    base: Option<String>,
    apis: Option<RoleConfigRaw>,
    assets: Option<RoleConfigRaw>,
    contents: Option<RoleConfigRaw>,
    metadata: Option<RoleConfigRaw>,
    pages: Option<RoleConfigRaw>,
    private: Option<RoleConfigRaw>,
    public: Option<RoleConfigRaw>,
    templates: Option<RoleConfigRaw>,
}

impl PathsConfigRaw {
    fn role(&self, role: Role) -> Option<&RoleConfigRaw> {
        match role {
            Role::Apis => self.apis.as_ref(),
            Role::Assets => self.assets.as_ref(),
            Role::Contents => self.contents.as_ref(),
            Role::Metadata => self.metadata.as_ref(),
            Role::Pages => self.pages.as_ref(),
            Role::Private => self.private.as_ref(),
            Role::Public => self.public.as_ref(),
            Role::Templates => self.templates.as_ref(),
        }
    }

    fn role_mut(&mut self, role: Role) -> Option<&mut RoleConfigRaw> {
        match role {
            Role::Apis => self.apis.as_mut(),
            Role::Assets => self.assets.as_mut(),
            Role::Contents => self.contents.as_mut(),
            Role::Metadata => self.metadata.as_mut(),
            Role::Pages => self.pages.as_mut(),
            Role::Private => self.private.as_mut(),
            Role::Public => self.public.as_mut(),
            Role::Templates => self.templates.as_mut(),
        }
    }
}

/// Raw `[paths.<role>]` table.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RoleConfigRaw {
    provider: Option<BackendKind>,
    path: Option<String>,
    hash: Option<String>,
    update_command: Option<String>,
    options: BTreeMap<String, String>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`paths.public.path`").
        field: String,
        /// Error message (e.g., "${`PUBLIC_DIR`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise, searches
    /// for `vellum.toml` in the current directory and its parents, falling
    /// back to defaults rooted at the current directory.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails or
    /// validation fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(base) = &settings.base {
            self.base_dir.clone_from(base);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Default configuration with every role under `base`.
    #[must_use]
    pub fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            paths: PathsConfigRaw::default(),
            base_dir: base.to_path_buf(),
            roles: Role::ALL
                .into_iter()
                .map(|role| (role, RoleConfig::default_for(role)))
                .collect(),
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir)?;
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        self.server.name = expand::expand_env(&self.server.name, "server.name")?;
        expand::expand_opt(&mut self.paths.base, "paths.base")?;

        for role in Role::ALL {
            let Some(raw) = self.paths.role_mut(role) else {
                continue;
            };
            expand::expand_opt(&mut raw.path, &format!("paths.{role}.path"))?;
            for (key, value) in &mut raw.options {
                *value = expand::expand_env(value, &format!("paths.{role}.options.{key}"))?;
            }
        }
        Ok(())
    }

    /// Resolve the base directory and per-role configuration.
    fn resolve_paths(&mut self, config_dir: &Path) -> Result<(), ConfigError> {
        self.base_dir = config_dir.join(self.paths.base.as_deref().unwrap_or("."));

        let mut roles = BTreeMap::new();
        for role in Role::ALL {
            let resolved = match self.paths.role(role) {
                Some(raw) => Self::resolve_role(role, raw)?,
                None => RoleConfig::default_for(role),
            };
            roles.insert(role, resolved);
        }
        self.roles = roles;
        Ok(())
    }

    fn resolve_role(role: Role, raw: &RoleConfigRaw) -> Result<RoleConfig, ConfigError> {
        let kind = raw.provider.unwrap_or(BackendKind::Local);
        let root = match (&raw.path, kind) {
            (Some(path), _) => path.clone(),
            (None, BackendKind::Local) => role.default_root().to_owned(),
            (None, BackendKind::Memory) => role.key().to_owned(),
            (None, BackendKind::Rclone) => String::new(),
        };
        let hash = match &raw.hash {
            Some(hash) => hash.parse::<HashAlgorithm>().map_err(|e| {
                ConfigError::Validation(format!("paths.{role}.hash: {e}"))
            })?,
            None => HashAlgorithm::default(),
        };
        Ok(RoleConfig {
            kind,
            root,
            hash,
            update_command: raw.update_command.clone(),
            options: raw.options.clone(),
        })
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_roles()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;
        require_non_empty(&self.server.name, "server.name")?;

        // Port 0 lets the OS pick a port, which is never what a config file means
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_roles(&self) -> Result<(), ConfigError> {
        for (role, config) in &self.roles {
            if config.kind != BackendKind::Rclone {
                continue;
            }
            if !role.is_source() {
                return Err(ConfigError::Validation(format!(
                    "paths.{role}.provider cannot be rclone: the role is written to"
                )));
            }
            if !matches!(config.hash, HashAlgorithm::Md5 | HashAlgorithm::Sha1) {
                return Err(ConfigError::Validation(format!(
                    "paths.{role}.hash must be md5 or sha1 with rclone, got {}",
                    config.hash
                )));
            }
        }
        Ok(())
    }

    /// Flattened `key: value` listing of the effective configuration.
    ///
    /// Values are JSON-encoded; lines are sorted by key.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut entries: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        entries.insert("server.host".to_owned(), self.server.host.clone().into());
        entries.insert("server.port".to_owned(), self.server.port.into());
        entries.insert("server.name".to_owned(), self.server.name.clone().into());
        entries.insert(
            "server.validate_requests".to_owned(),
            self.server.validate_requests.clone().into(),
        );
        entries.insert(
            "server.configure_responses".to_owned(),
            self.server.configure_responses.clone().into(),
        );
        entries.insert(
            "paths.base".to_owned(),
            self.base_dir.display().to_string().into(),
        );
        for (role, config) in &self.roles {
            let prefix = format!("paths.{role}");
            entries.insert(format!("{prefix}.provider"), config.kind.to_string().into());
            entries.insert(format!("{prefix}.path"), config.root.clone().into());
            entries.insert(format!("{prefix}.hash"), config.hash.to_string().into());
            entries.insert(
                format!("{prefix}.update_command"),
                config.update_command.clone().into(),
            );
            for (key, value) in &config.options {
                entries.insert(format!("{prefix}.options.{key}"), value.clone().into());
            }
        }

        entries
            .into_iter()
            .map(|(key, value)| format!("{key}: {value}\n"))
            .collect()
    }
}

//! Roles and the registry binding each role to a backend.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::expiry::Clock;
use crate::local::LocalStorage;
use crate::memory::MemoryStorage;
use crate::remote::{RcloneOptions, RcloneStorage};
use crate::storage::{BackendKind, Storage, StorageError, StorageErrorKind};
use crate::version::HashAlgorithm;

/// Fixed logical storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Proxy descriptors.
    Apis,
    /// Raw files copied verbatim to Public.
    Assets,
    /// YAML content files referenced by pages.
    Contents,
    /// Metadata sidecars.
    Metadata,
    /// Page descriptors.
    Pages,
    /// Compiled API descriptors.
    Private,
    /// Served output.
    Public,
    /// Template bodies and includes.
    Templates,
}

impl Role {
    /// Every role, in registry order.
    pub const ALL: [Role; 8] = [
        Role::Apis,
        Role::Assets,
        Role::Contents,
        Role::Metadata,
        Role::Pages,
        Role::Private,
        Role::Public,
        Role::Templates,
    ];

    /// Lowercase configuration key.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Role::Apis => "apis",
            Role::Assets => "assets",
            Role::Contents => "contents",
            Role::Metadata => "metadata",
            Role::Pages => "pages",
            Role::Private => "private",
            Role::Public => "public",
            Role::Templates => "templates",
        }
    }

    /// Capitalized name used in reports.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Role::Apis => "Apis",
            Role::Assets => "Assets",
            Role::Contents => "Contents",
            Role::Metadata => "Metadata",
            Role::Pages => "Pages",
            Role::Private => "Private",
            Role::Public => "Public",
            Role::Templates => "Templates",
        }
    }

    /// Whether the role only feeds generation and is never written by it.
    #[must_use]
    pub fn is_source(self) -> bool {
        matches!(
            self,
            Role::Apis | Role::Assets | Role::Contents | Role::Pages | Role::Templates
        )
    }

    /// Default root relative to the base directory.
    #[must_use]
    pub fn default_root(self) -> &'static str {
        match self {
            Role::Apis => "source/apis",
            Role::Assets => "source/assets",
            Role::Contents => "source/contents",
            Role::Metadata => "cache/metadata",
            Role::Pages => "source/pages",
            Role::Private => "cache/private",
            Role::Public => "cache/public",
            Role::Templates => "source/templates",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Role {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                StorageError::new(StorageErrorKind::InvalidConfig)
                    .with_message(format!("unknown role '{s}'"))
            })
    }
}

/// Configuration for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleConfig {
    /// Backend variant.
    pub kind: BackendKind,
    /// Root: directory for local, remote path for rclone, label for memory.
    pub root: String,
    /// Hash algorithm for version snapshots.
    pub hash: HashAlgorithm,
    /// Expression evaluated by the role update endpoint.
    pub update_command: Option<String>,
    /// Free-form backend options.
    pub options: BTreeMap<String, String>,
}

impl RoleConfig {
    /// Local backend at the role's default root.
    #[must_use]
    pub fn default_for(role: Role) -> Self {
        Self {
            kind: BackendKind::Local,
            root: role.default_root().to_owned(),
            hash: HashAlgorithm::default(),
            update_command: None,
            options: BTreeMap::new(),
        }
    }
}

/// One registry slot.
pub struct PathEntry {
    /// Configuration the backend was built from, with the root resolved.
    pub config: RoleConfig,
    /// The backend.
    pub storage: Arc<dyn Storage>,
}

/// Immutable map from role to backend.
///
/// Built once at startup. Backends are validated while building, so invalid
/// combinations (e.g. a remote Public role) never reach the orchestrator.
pub struct PathRegistry {
    entries: Vec<PathEntry>,
}

impl PathRegistry {
    /// Build backends for every role.
    ///
    /// Roles missing from `configs` use [`RoleConfig::default_for`]. Relative
    /// local roots resolve against `base`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageErrorKind::InvalidConfig`] if a backend rejects its
    /// configuration.
    pub fn build(
        configs: &BTreeMap<Role, RoleConfig>,
        base: &Path,
        clock: &Arc<dyn Clock>,
    ) -> Result<Self, StorageError> {
        let mut entries = Vec::with_capacity(Role::ALL.len());
        for role in Role::ALL {
            let mut config = configs
                .get(&role)
                .cloned()
                .unwrap_or_else(|| RoleConfig::default_for(role));
            let storage: Arc<dyn Storage> = match config.kind {
                BackendKind::Local => {
                    let root = base.join(&config.root);
                    config.root = root.display().to_string();
                    Arc::new(LocalStorage::new(role, root, config.hash))
                }
                BackendKind::Memory => Arc::new(MemoryStorage::new(
                    role,
                    config.root.clone(),
                    Arc::clone(clock),
                )),
                BackendKind::Rclone => Arc::new(RcloneStorage::new(
                    role,
                    config.root.clone(),
                    config.hash,
                    RcloneOptions::from_map(&config.options),
                )?),
            };
            tracing::debug!("{role} -> {} ({})", config.root, config.kind);
            entries.push(PathEntry { config, storage });
        }
        Ok(Self { entries })
    }

    /// Build a registry from already-constructed backends.
    ///
    /// # Errors
    ///
    /// Returns [`StorageErrorKind::InvalidConfig`] if a role is missing or a
    /// backend is bound to a different role than the one it serves.
    pub fn from_backends(backends: Vec<Arc<dyn Storage>>) -> Result<Self, StorageError> {
        let mut slots: Vec<Option<PathEntry>> = Role::ALL.iter().map(|_| None).collect();
        for storage in backends {
            let role = storage.role();
            let config = RoleConfig {
                kind: storage.kind(),
                root: storage.root().to_owned(),
                ..RoleConfig::default_for(role)
            };
            slots[role.index()] = Some(PathEntry { config, storage });
        }
        let entries = slots
            .into_iter()
            .zip(Role::ALL)
            .map(|(slot, role)| {
                slot.ok_or_else(|| {
                    StorageError::new(StorageErrorKind::InvalidConfig)
                        .with_message(format!("no backend for role {role}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    /// Slot for a role.
    #[must_use]
    pub fn entry(&self, role: Role) -> &PathEntry {
        &self.entries[role.index()]
    }

    /// Backend for a role.
    #[must_use]
    pub fn get(&self, role: Role) -> &dyn Storage {
        self.entries[role.index()].storage.as_ref()
    }

    /// Iterate roles in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (Role, &PathEntry)> {
        Role::ALL.into_iter().zip(self.entries.iter())
    }

    #[must_use]
    pub fn apis(&self) -> &dyn Storage {
        self.get(Role::Apis)
    }

    #[must_use]
    pub fn assets(&self) -> &dyn Storage {
        self.get(Role::Assets)
    }

    #[must_use]
    pub fn contents(&self) -> &dyn Storage {
        self.get(Role::Contents)
    }

    #[must_use]
    pub fn metadata(&self) -> &dyn Storage {
        self.get(Role::Metadata)
    }

    #[must_use]
    pub fn pages(&self) -> &dyn Storage {
        self.get(Role::Pages)
    }

    #[must_use]
    pub fn private(&self) -> &dyn Storage {
        self.get(Role::Private)
    }

    #[must_use]
    pub fn public(&self) -> &dyn Storage {
        self.get(Role::Public)
    }

    #[must_use]
    pub fn templates(&self) -> &dyn Storage {
        self.get(Role::Templates)
    }
}

//! Staleness reports and health results.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::metadata::ArtifactType;

/// Freshness of a cached artifact against its recorded sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StalenessStatus {
    UpToDate,
    /// Cached output changed since it was produced.
    Modified,
    /// Cached output is gone.
    Removed,
    ApiModified,
    ApiRemoved,
    AssetModified,
    AssetRemoved,
    PageModified,
    PageRemoved,
    ContentModified,
    ContentRemoved,
    TemplateModified,
    TemplateRemoved,
    /// Sidecar unreadable or missing required versions.
    MetadataCorrupted,
    /// Cached output without a sidecar.
    Orphan,
    /// Checking failed unexpectedly.
    Error,
}

impl StalenessStatus {
    #[must_use]
    pub fn is_up_to_date(self) -> bool {
        self == Self::UpToDate
    }
}

impl std::fmt::Display for StalenessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&format!("{self:?}"))
    }
}

/// Kind of a listed cache entry.
///
/// `Private` and `Public` mark entries found without a sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Api,
    Asset,
    Page,
    Private,
    Public,
    Unknown,
}

impl EntryKind {
    /// Whether the entry lives in the Private role.
    #[must_use]
    pub fn is_private(self) -> bool {
        matches!(self, Self::Api | Self::Private)
    }

    /// Whether the entry lives in the Public role.
    #[must_use]
    pub fn is_public(self) -> bool {
        matches!(self, Self::Asset | Self::Page | Self::Public)
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::Api => "api",
            Self::Asset => "asset",
            Self::Page => "page",
            Self::Private => "private",
            Self::Public => "public",
            Self::Unknown => "unknown",
        })
    }
}

impl From<ArtifactType> for EntryKind {
    fn from(artifact: ArtifactType) -> Self {
        match artifact {
            ArtifactType::Api => Self::Api,
            ArtifactType::Asset => Self::Asset,
            ArtifactType::Page => Self::Page,
        }
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "asset" => Ok(Self::Asset),
            "page" => Ok(Self::Page),
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown entry type '{other}'")),
        }
    }
}

/// One line of the cache status listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatusInfo {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Role-relative artifact name (or sidecar name when corrupted).
    pub name: String,
    pub status: StalenessStatus,
}

impl FileStatusInfo {
    #[must_use]
    pub fn new(kind: EntryKind, name: impl Into<String>, status: StalenessStatus) -> Self {
        Self {
            kind,
            name: name.into(),
            status,
        }
    }
}

/// Cache entry addressed by kind and name, as accepted by bulk deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRef {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub file: String,
}

/// Result of purging one outdated entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedEntry {
    pub file: String,
    pub reason: StalenessStatus,
    pub deleted: bool,
}

/// Result of one health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthCheck {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

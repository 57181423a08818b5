//! Typed lookup results and the page descriptor format.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a request path resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ResourceDescriptor {
    /// Already cached in Public; the producing kind is not looked up.
    Unknown {
        /// Public-role path.
        public: String,
    },
    /// Not cached; a page descriptor can generate it.
    Page {
        /// Public-role output path.
        public: String,
        /// Pages-role descriptor path.
        descriptor: String,
    },
    /// Not cached; an asset can be copied.
    Asset {
        /// Public-role output path.
        public: String,
        /// Assets-role source path.
        source: String,
    },
    /// Reverse-proxy API.
    #[serde(rename = "api")]
    ApiProxy {
        /// Private-role descriptor path.
        private: String,
        /// ApiSources-role descriptor path.
        source: String,
        /// Whether the descriptor is already in Private.
        exists: bool,
    },
    /// Nothing can serve this path.
    NotFound {
        /// Requested path.
        name: String,
    },
}

impl ResourceDescriptor {
    /// Whether the artifact is already cached.
    #[must_use]
    pub fn exists(&self) -> bool {
        match self {
            Self::Unknown { .. } => true,
            Self::ApiProxy { exists, .. } => *exists,
            Self::Page { .. } | Self::Asset { .. } | Self::NotFound { .. } => false,
        }
    }

    /// Cache-side name of the artifact.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Unknown { public } | Self::Page { public, .. } | Self::Asset { public, .. } => {
                public
            }
            Self::ApiProxy { private, .. } => private,
            Self::NotFound { name } => name,
        }
    }
}

/// Kind of API served under `/api/{type}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    /// Declarative reverse proxy.
    Proxy,
}

impl FromStr for ApiType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "proxy" => Ok(Self::Proxy),
            other => Err(format!("unknown api type '{other}'")),
        }
    }
}

/// Page descriptor file stored in the Pages role.
///
/// ```yaml
/// templateFiles: [layout/header.html, index.html]
/// templateIncludes: [partials/nav.html]
/// contentFiles: [site.yml]
/// content:
///   title: Home
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDescriptor {
    /// Inline scope layered after the content files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<BTreeMap<String, serde_yaml::Value>>,
    /// Contents-role YAML files, each pushed as a scope in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_files: Vec<String>,
    /// Templates-role files concatenated into the page body.
    pub template_files: Vec<String>,
    /// Templates-role files the body may include by name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template_includes: Vec<String>,
}

impl PageDescriptor {
    /// Parse a descriptor from YAML.
    pub fn from_yaml(source: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }

    /// Template and include files, without duplicates, in declared order.
    #[must_use]
    pub fn tracked_templates(&self) -> Vec<String> {
        let mut tracked: Vec<String> = Vec::new();
        for file in self.template_files.iter().chain(&self.template_includes) {
            if !tracked.contains(file) {
                tracked.push(file.clone());
            }
        }
        tracked
    }
}

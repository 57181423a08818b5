//! Metadata sidecars linking an artifact to the versions that produced it.

use serde::{Deserialize, Serialize};
use vellum_storage::FileVersion;

/// Kind of generated artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    /// Proxy descriptor copied to Private.
    Api,
    /// Asset copied to Public.
    Asset,
    /// Page rendered to Public.
    Page,
}

/// Sidecar stored in the Metadata role as `<artifact>.yml`.
///
/// Fields that do not apply to the artifact type are omitted when written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    #[serde(rename = "type")]
    pub artifact: ArtifactType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<FileVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<FileVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<FileVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<FileVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<FileVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<Vec<FileVersion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<Vec<FileVersion>>,
}

impl FileMetadata {
    /// Metadata for an API copied from `api` to `private`.
    #[must_use]
    pub fn api(private: FileVersion, api: FileVersion) -> Self {
        Self {
            private: Some(private),
            api: Some(api),
            ..Self::empty(ArtifactType::Api)
        }
    }

    /// Metadata for an asset copied from `asset` to `public`.
    #[must_use]
    pub fn asset(public: FileVersion, asset: FileVersion) -> Self {
        Self {
            public: Some(public),
            asset: Some(asset),
            ..Self::empty(ArtifactType::Asset)
        }
    }

    /// Metadata for a page rendered from its descriptor, contents and templates.
    #[must_use]
    pub fn page(
        public: FileVersion,
        page: FileVersion,
        contents: Vec<FileVersion>,
        templates: Vec<FileVersion>,
    ) -> Self {
        Self {
            public: Some(public),
            page: Some(page),
            contents: (!contents.is_empty()).then_some(contents),
            templates: Some(templates),
            ..Self::empty(ArtifactType::Page)
        }
    }

    fn empty(artifact: ArtifactType) -> Self {
        Self {
            artifact,
            private: None,
            public: None,
            api: None,
            asset: None,
            page: None,
            contents: None,
            templates: None,
        }
    }

    /// Name of the tracked artifact: the public output, else the private one.
    #[must_use]
    pub fn artifact_name(&self) -> Option<&str> {
        self.public
            .as_ref()
            .or(self.private.as_ref())
            .map(|v| v.name.as_str())
    }

    /// Metadata-role path of this record.
    #[must_use]
    pub fn sidecar_path(&self) -> Option<String> {
        self.artifact_name().map(sidecar_path)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn from_yaml(source: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }
}

/// Metadata-role path of the sidecar for an artifact.
#[must_use]
pub fn sidecar_path(artifact: &str) -> String {
    format!("{artifact}.yml")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;

    fn version(name: &str) -> FileVersion {
        FileVersion {
            name: name.to_owned(),
            hash: "abc".to_owned(),
            size: 3,
            modified: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn test_asset_yaml_omits_unused_fields() {
        let metadata = FileMetadata::asset(version("a.txt"), version("a.txt"));

        let yaml = metadata.to_yaml().unwrap();

        assert!(yaml.starts_with("type: asset\n"));
        assert!(yaml.contains("public:"));
        assert!(yaml.contains("asset:"));
        assert!(!yaml.contains("private"));
        assert!(!yaml.contains("templates"));
        assert!(!yaml.contains("null"));
    }

    #[test]
    fn test_page_yaml_round_trips() {
        let metadata = FileMetadata::page(
            version("index.html"),
            version("index.html.yml"),
            vec![version("site.yml")],
            vec![version("a.txt"), version("b.txt")],
        );

        let parsed = FileMetadata::from_yaml(&metadata.to_yaml().unwrap()).unwrap();

        assert_eq!(parsed, metadata);
    }

    #[test]
    fn test_page_without_contents_has_none() {
        let metadata =
            FileMetadata::page(version("p"), version("p.yml"), vec![], vec![version("t")]);

        assert_eq!(metadata.contents, None);
    }

    #[test]
    fn test_sidecar_path_prefers_public() {
        let api = FileMetadata::api(version("api/proxy/x.yml"), version("proxy/x.yml"));
        let asset = FileMetadata::asset(version("img/logo.png"), version("img/logo.png"));

        assert_eq!(api.sidecar_path().as_deref(), Some("api/proxy/x.yml.yml"));
        assert_eq!(asset.sidecar_path().as_deref(), Some("img/logo.png.yml"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(FileMetadata::from_yaml("type: video\n").is_err());
    }
}

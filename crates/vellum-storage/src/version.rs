//! File version snapshots and hash algorithms.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use md5::Digest as _;
use serde::{Deserialize, Serialize};
use sha1::Digest as _;

/// Immutable snapshot of one file, used to detect changes after generation.
///
/// `name` is relative to the role that produced it. Two versions are equal
/// only when every field matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVersion {
    /// Role-relative path.
    pub name: String,
    /// Lowercase hex digest in the role's hash algorithm.
    pub hash: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

impl FileVersion {
    /// Cheap comparison: size and modification time only.
    #[must_use]
    pub fn same_shape(&self, other: &FileVersion) -> bool {
        self.size == other.size && self.modified == other.modified
    }
}

/// Digest used for [`FileVersion::hash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Hex digest of `bytes`.
    #[must_use]
    pub fn digest(self, bytes: &[u8]) -> String {
        match self {
            Self::Md5 => hex::encode(md5::Md5::digest(bytes)),
            Self::Sha1 => hex::encode(sha1::Sha1::digest(bytes)),
            Self::Sha256 => hex::encode(sha2::Sha256::digest(bytes)),
            Self::Sha384 => hex::encode(sha2::Sha384::digest(bytes)),
            Self::Sha512 => hex::encode(sha2::Sha512::digest(bytes)),
        }
    }

    /// Canonical lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized hash algorithm name.
#[derive(Debug, thiserror::Error)]
#[error("unknown hash algorithm '{0}' (expected md5, sha1, sha256, sha384 or sha512)")]
pub struct UnknownHashAlgorithm(pub String);

impl FromStr for HashAlgorithm {
    type Err = UnknownHashAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(UnknownHashAlgorithm(s.to_owned())),
        }
    }
}

/// Fast process-local fingerprint used by the memory backend.
pub(crate) fn fingerprint(bytes: &[u8]) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(bytes))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_digest_known_values() {
        assert_eq!(
            HashAlgorithm::Md5.digest(b"hello"),
            "5d41402abc4b2a76b9719d911017c592"
        );
        assert_eq!(
            HashAlgorithm::Sha1.digest(b"hello"),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
        assert_eq!(
            HashAlgorithm::Sha256.digest(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_digest_lengths() {
        assert_eq!(HashAlgorithm::Sha384.digest(b"x").len(), 96);
        assert_eq!(HashAlgorithm::Sha512.digest(b"x").len(), 128);
    }

    #[test]
    fn test_hash_algorithm_from_str() {
        assert_eq!("SHA-1".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha1);
        assert_eq!("md5".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        assert_eq!("Sha512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert!("crc32".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_hash_algorithm_default_is_sha256() {
        assert_eq!(HashAlgorithm::default(), HashAlgorithm::Sha256);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
        assert_eq!(fingerprint(b"abc").len(), 16);
    }

    #[test]
    fn test_file_version_yaml_keys() {
        let version = FileVersion {
            name: "a.txt".to_owned(),
            hash: "00".to_owned(),
            size: 3,
            modified: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        };

        let yaml = serde_yaml::to_string(&version).unwrap();
        assert!(yaml.contains("name: a.txt"));
        assert!(yaml.contains("modified:"));

        let back: FileVersion = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, version);
    }

    #[test]
    fn test_same_shape_ignores_hash() {
        let modified = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let a = FileVersion {
            name: "a".to_owned(),
            hash: "1".to_owned(),
            size: 1,
            modified,
        };
        let b = FileVersion {
            hash: "2".to_owned(),
            ..a.clone()
        };

        assert!(a.same_shape(&b));
        assert_ne!(a, b);
    }
}

//! In-memory backend with sliding expiry.
//!
//! Provides [`MemoryStorage`] for roles whose content can be regenerated at
//! will. Entries disappear after [`DEFAULT_TTL`] without access.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::expiry::{Clock, DEFAULT_TTL, ExpiringMap};
use crate::registry::Role;
use crate::storage::{
    BackendKind, Storage, StorageError, StorageMetrics, compile_pattern, normalize_path,
};
use crate::version::{FileVersion, fingerprint};

/// Backend identifier for error messages.
const BACKEND: &str = "Memory";

#[derive(Clone)]
struct MemoryEntry {
    version: FileVersion,
    content: Arc<[u8]>,
}

/// Expiring in-process storage.
///
/// Versions use a fast non-cryptographic fingerprint, so they are only
/// comparable within the same process.
pub struct MemoryStorage {
    role: Role,
    label: String,
    entries: ExpiringMap<String, MemoryEntry>,
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("role", &self.role)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl MemoryStorage {
    /// Create an empty backend with the default idle lifetime.
    #[must_use]
    pub fn new(role: Role, label: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(role, label, DEFAULT_TTL, clock)
    }

    /// Create an empty backend with a custom idle lifetime.
    #[must_use]
    pub fn with_ttl(
        role: Role,
        label: impl Into<String>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            role,
            label: label.into(),
            entries: ExpiringMap::new(ttl, clock),
        }
    }

    fn key(path: &str) -> Result<String, StorageError> {
        normalize_path(path, BACKEND)
    }

    fn entry(&self, path: &str) -> Result<MemoryEntry, StorageError> {
        let key = Self::key(path)?;
        self.entries
            .get(&key)
            .ok_or_else(|| StorageError::not_found(key).with_backend(BACKEND))
    }
}

impl Storage for MemoryStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn role(&self) -> Role {
        self.role
    }

    fn root(&self) -> &str {
        &self.label
    }

    fn exists(&self, path: &str) -> bool {
        Self::key(path).is_ok_and(|key| self.entries.contains(&key))
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        Ok(self.entry(path)?.content.to_vec())
    }

    fn write_bytes(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        let key = Self::key(path)?;
        let version = FileVersion {
            name: key.clone(),
            hash: fingerprint(content),
            size: content.len() as u64,
            modified: Utc::now(),
        };
        self.entries.insert(
            key,
            MemoryEntry {
                version,
                content: Arc::from(content),
            },
        );
        Ok(())
    }

    fn copy_from(
        &self,
        path: &str,
        source: &dyn Storage,
        target: &str,
    ) -> Result<(), StorageError> {
        if self.role != Role::Private || source.role() != Role::Apis {
            tracing::debug!(
                "memory {} ignores copy of {path} from {}",
                self.role,
                source.role()
            );
            return Ok(());
        }
        let content = source.read_bytes(path)?;
        self.write_bytes(target, &content)
    }

    fn compute_version(&self, path: &str) -> Result<FileVersion, StorageError> {
        Ok(self.entry(path)?.version)
    }

    fn compare_version(&self, expected: &FileVersion, with_hash: bool) -> Result<bool, StorageError> {
        let Ok(entry) = self.entry(&expected.name) else {
            return Ok(false);
        };
        if !entry.version.same_shape(expected) {
            return Ok(false);
        }
        Ok(!with_hash || fingerprint(&entry.content) == expected.hash)
    }

    fn list(&self, pattern: &str) -> Result<Vec<String>, StorageError> {
        let pattern = compile_pattern(pattern, BACKEND)?;
        let mut names: Vec<String> = self
            .entries
            .snapshot()
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| pattern.matches(name))
            .collect();
        names.sort();
        Ok(names)
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.entries.remove(&Self::key(path)?);
        Ok(())
    }

    fn delete_all(&self) -> Vec<StorageError> {
        self.entries.clear();
        Vec::new()
    }

    fn is_writable(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn metrics(&self, pattern: &str) -> StorageMetrics {
        let pattern = match compile_pattern(pattern, BACKEND) {
            Ok(pattern) => pattern,
            Err(e) => {
                return StorageMetrics {
                    errors: vec![e.to_string()],
                    ..StorageMetrics::default()
                };
            }
        };

        let mut metrics = StorageMetrics::default();
        for (name, entry) in self.entries.snapshot() {
            if pattern.matches(&name) {
                metrics.file_count += 1;
                metrics.total_bytes += entry.content.len() as u64;
            }
        }
        metrics
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::expiry::ManualClock;
    use crate::storage::StorageErrorKind;

    fn storage(role: Role) -> (MemoryStorage, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let dyn_clock: Arc<dyn Clock> = Arc::<ManualClock>::clone(&clock);
        (MemoryStorage::new(role, "memory", dyn_clock), clock)
    }

    #[test]
    fn test_write_read_delete() {
        let (storage, _) = storage(Role::Public);

        storage.write("a/b.txt", "content").unwrap();
        assert!(storage.exists("a/b.txt"));
        assert_eq!(storage.read("/a/b.txt").unwrap(), "content");

        storage.delete("a/b.txt").unwrap();
        assert!(!storage.exists("a/b.txt"));
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let (storage, _) = storage(Role::Public);

        let err = storage.read("nope").unwrap_err();

        assert_eq!(err.kind, StorageErrorKind::NotFound);
    }

    #[test]
    fn test_entries_expire_when_idle() {
        let (storage, clock) = storage(Role::Public);
        storage.write("a.txt", "x").unwrap();

        clock.advance(DEFAULT_TTL);

        assert!(!storage.exists("a.txt"));
        assert!(storage.list("*").unwrap().is_empty());
    }

    #[test]
    fn test_version_uses_fingerprint() {
        let (storage, _) = storage(Role::Public);
        storage.write("a.txt", "hello").unwrap();

        let version = storage.compute_version("a.txt").unwrap();

        assert_eq!(version.size, 5);
        assert_eq!(version.hash, fingerprint(b"hello"));
        assert_eq!(storage.compute_version("a.txt").unwrap(), version);
    }

    #[test]
    fn test_compute_version_missing_fails() {
        let (storage, _) = storage(Role::Public);

        assert!(storage.compute_version("a.txt").is_err());
    }

    #[test]
    fn test_compare_version_with_hash() {
        let (storage, _) = storage(Role::Public);
        storage.write("a.txt", "hello").unwrap();
        let mut version = storage.compute_version("a.txt").unwrap();
        assert!(storage.compare_version(&version, true).unwrap());

        version.hash = "0".repeat(16);
        assert!(storage.compare_version(&version, false).unwrap());
        assert!(!storage.compare_version(&version, true).unwrap());
    }

    #[test]
    fn test_copy_from_apis_into_private() {
        let (apis, _) = storage(Role::Apis);
        let (private, _) = storage(Role::Private);
        apis.write("proxy/a.yml", "configureResponse: x").unwrap();

        private
            .copy_from("proxy/a.yml", &apis, "api/proxy/a.yml")
            .unwrap();

        assert_eq!(private.read("api/proxy/a.yml").unwrap(), "configureResponse: x");
    }

    #[test]
    fn test_copy_from_other_roles_is_noop() {
        let (assets, _) = storage(Role::Assets);
        let (public, _) = storage(Role::Public);
        assets.write("a.txt", "x").unwrap();

        public.copy_from("a.txt", &assets, "a.txt").unwrap();

        assert!(!public.exists("a.txt"));
    }

    #[test]
    fn test_list_and_metrics_honor_pattern() {
        let (storage, _) = storage(Role::Metadata);
        storage.write("b.yml", "12").unwrap();
        storage.write("a.yml", "1").unwrap();
        storage.write("c.txt", "123").unwrap();

        assert_eq!(storage.list("*.yml").unwrap(), vec!["a.yml", "b.yml"]);

        let metrics = storage.metrics("*");
        assert_eq!(metrics.file_count, 3);
        assert_eq!(metrics.total_bytes, 6);
    }

    #[test]
    fn test_delete_all_and_writable() {
        let (storage, _) = storage(Role::Public);
        storage.write("a.txt", "x").unwrap();

        assert!(storage.delete_all().is_empty());
        assert!(storage.is_writable().is_ok());
        assert!(!storage.exists("a.txt"));
    }
}

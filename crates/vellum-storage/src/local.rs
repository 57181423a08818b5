//! Local filesystem backend.
//!
//! Provides [`LocalStorage`], rooted at a directory on the host filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::registry::Role;
use crate::storage::{
    BackendKind, Storage, StorageError, StorageMetrics, compile_pattern, normalize_path,
};
use crate::version::{FileVersion, HashAlgorithm};

/// Backend identifier for error messages.
const BACKEND: &str = "Local";

/// Prefix of the probe file created by [`LocalStorage::is_writable`].
const PROBE_PREFIX: &str = ".vellum-probe-";

/// Filesystem storage rooted at a directory.
///
/// The root is created lazily on first write. Every path is validated against
/// traversal before it touches the disk.
#[derive(Debug)]
pub struct LocalStorage {
    role: Role,
    root: PathBuf,
    root_display: String,
    hash: HashAlgorithm,
}

impl LocalStorage {
    /// Create a backend for `role` rooted at `root`.
    #[must_use]
    pub fn new(role: Role, root: PathBuf, hash: HashAlgorithm) -> Self {
        let root_display = root.display().to_string();
        Self {
            role,
            root,
            root_display,
            hash,
        }
    }

    /// Map a role-relative path to its normalized name and full path.
    fn resolve(&self, path: &str) -> Result<(String, PathBuf), StorageError> {
        let name = normalize_path(path, BACKEND)?;
        let full = self.root.join(&name);
        Ok((name, full))
    }

    fn io_error(err: std::io::Error, path: &Path) -> StorageError {
        StorageError::io(err, Some(path.to_path_buf())).with_backend(BACKEND)
    }

    fn version_at(&self, name: String, full: &Path, with_hash: bool) -> Result<FileVersion, StorageError> {
        let meta = fs::metadata(full).map_err(|e| Self::io_error(e, full))?;
        let modified: DateTime<Utc> = meta
            .modified()
            .map_err(|e| Self::io_error(e, full))?
            .into();
        let hash = if with_hash {
            let bytes = fs::read(full).map_err(|e| Self::io_error(e, full))?;
            self.hash.digest(&bytes)
        } else {
            String::new()
        };
        Ok(FileVersion {
            name,
            hash,
            size: meta.len(),
            modified,
        })
    }

    /// Collect every file under `dir` as (relative name, full path).
    fn walk(dir: &Path, prefix: &str, out: &mut Vec<(String, PathBuf)>, errors: &mut Vec<String>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                errors.push(format!("{}: {e}", dir.display()));
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    errors.push(format!("{}: {e}", dir.display()));
                    continue;
                }
            };
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let rel = if prefix.is_empty() {
                file_name
            } else {
                format!("{prefix}/{file_name}")
            };
            let path = entry.path();
            match entry.file_type() {
                Ok(t) if t.is_dir() => Self::walk(&path, &rel, out, errors),
                Ok(_) => out.push((rel, path)),
                Err(e) => errors.push(format!("{}: {e}", path.display())),
            }
        }
    }

    fn matching_files(&self, pattern: &str) -> Result<(Vec<(String, PathBuf)>, Vec<String>), StorageError> {
        let pattern = compile_pattern(pattern, BACKEND)?;
        let mut files = Vec::new();
        let mut errors = Vec::new();
        Self::walk(&self.root, "", &mut files, &mut errors);
        files.retain(|(name, _)| pattern.matches(name));
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok((files, errors))
    }
}

impl Storage for LocalStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn role(&self) -> Role {
        self.role
    }

    fn root(&self) -> &str {
        &self.root_display
    }

    fn local_root(&self) -> Option<&Path> {
        Some(&self.root)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|(_, full)| full.is_file())
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let (_, full) = self.resolve(path)?;
        fs::read(&full).map_err(|e| Self::io_error(e, &full))
    }

    fn write_bytes(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        let (_, full) = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| Self::io_error(e, parent))?;
        }
        fs::write(&full, content).map_err(|e| Self::io_error(e, &full))
    }

    fn copy_from(
        &self,
        path: &str,
        source: &dyn Storage,
        target: &str,
    ) -> Result<(), StorageError> {
        let Some(source_root) = source.local_root() else {
            return source.copy_to(path, self, target);
        };

        let from = source_root.join(normalize_path(path, BACKEND)?);
        let (_, to) = self.resolve(target)?;
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| Self::io_error(e, parent))?;
        }
        fs::copy(&from, &to).map_err(|e| Self::io_error(e, &from))?;
        Ok(())
    }

    fn compute_version(&self, path: &str) -> Result<FileVersion, StorageError> {
        let (name, full) = self.resolve(path)?;
        self.version_at(name, &full, true)
    }

    fn compare_version(&self, expected: &FileVersion, with_hash: bool) -> Result<bool, StorageError> {
        let (name, full) = self.resolve(&expected.name)?;
        if !full.is_file() {
            return Ok(false);
        }
        let current = self.version_at(name, &full, with_hash)?;
        if !current.same_shape(expected) {
            return Ok(false);
        }
        Ok(!with_hash || current.hash == expected.hash)
    }

    fn list(&self, pattern: &str) -> Result<Vec<String>, StorageError> {
        let (files, errors) = self.matching_files(pattern)?;
        for error in errors {
            tracing::warn!("failed to list {}: {error}", self.root_display);
        }
        Ok(files.into_iter().map(|(name, _)| name).collect())
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        let (_, full) = self.resolve(path)?;
        match fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(e, &full)),
        }
    }

    fn delete_all(&self) -> Vec<StorageError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => return vec![Self::io_error(e, &self.root)],
        };

        let mut failures = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    failures.push(Self::io_error(e, &self.root));
                    continue;
                }
            };
            let path = entry.path();
            let result = if entry.file_type().is_ok_and(|t| t.is_dir()) {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            if let Err(e) = result {
                failures.push(Self::io_error(e, &path));
            }
        }
        failures
    }

    fn is_writable(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|e| Self::io_error(e, &self.root))?;
        let probe = self
            .root
            .join(format!("{PROBE_PREFIX}{}", uuid::Uuid::new_v4().simple()));
        fs::write(&probe, b"").map_err(|e| Self::io_error(e, &probe))?;
        fs::remove_file(&probe).map_err(|e| Self::io_error(e, &probe))
    }

    fn metrics(&self, pattern: &str) -> StorageMetrics {
        let (files, mut errors) = match self.matching_files(pattern) {
            Ok(found) => found,
            Err(e) => {
                return StorageMetrics {
                    errors: vec![e.to_string()],
                    ..StorageMetrics::default()
                };
            }
        };

        let mut metrics = StorageMetrics::default();
        for (_, path) in files {
            match fs::metadata(&path) {
                Ok(meta) => {
                    metrics.file_count += 1;
                    metrics.total_bytes += meta.len();
                }
                Err(e) => errors.push(format!("{}: {e}", path.display())),
            }
        }
        metrics.errors = errors;
        metrics
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;
    use crate::storage::StorageErrorKind;

    fn storage(root: &Path) -> LocalStorage {
        LocalStorage::new(Role::Public, root.to_path_buf(), HashAlgorithm::Sha256)
    }

    #[test]
    fn test_write_read_delete() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path());

        storage.write("nested/a.txt", "hello").unwrap();
        assert!(storage.exists("nested/a.txt"));
        assert_eq!(storage.read("nested/a.txt").unwrap(), "hello");

        storage.delete("nested/a.txt").unwrap();
        assert!(!storage.exists("nested/a.txt"));
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let err = storage(dir.path()).read("missing.txt").unwrap_err();

        assert_eq!(err.kind, StorageErrorKind::NotFound);
        assert_eq!(err.backend, Some("Local"));
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let dir = tempdir().unwrap();
        assert!(storage(dir.path()).delete("missing.txt").is_ok());
    }

    #[test]
    fn test_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path());

        let err = storage.write("../escape.txt", "x").unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::InvalidPath);
        assert!(!storage.exists("../escape.txt"));
    }

    #[test]
    fn test_compute_version_is_deterministic() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path());
        storage.write("a.txt", "hello").unwrap();

        let first = storage.compute_version("a.txt").unwrap();
        let second = storage.compute_version("a.txt").unwrap();

        assert_eq!(first, second);
        assert_eq!(first.name, "a.txt");
        assert_eq!(first.size, 5);
        assert_eq!(
            first.hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_compare_version_cheap_ignores_hash() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path());
        storage.write("a.txt", "hello").unwrap();
        let mut version = storage.compute_version("a.txt").unwrap();
        version.hash = "bogus".to_owned();

        assert!(storage.compare_version(&version, false).unwrap());
        assert!(!storage.compare_version(&version, true).unwrap());
    }

    #[test]
    fn test_compare_version_detects_size_change() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path());
        storage.write("a.txt", "hello").unwrap();
        let version = storage.compute_version("a.txt").unwrap();

        storage.write("a.txt", "hello world").unwrap();

        assert!(!storage.compare_version(&version, false).unwrap());
    }

    #[test]
    fn test_compare_version_missing_file_is_false() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path());
        storage.write("a.txt", "hello").unwrap();
        let version = storage.compute_version("a.txt").unwrap();
        storage.delete("a.txt").unwrap();

        assert!(!storage.compare_version(&version, true).unwrap());
    }

    #[test]
    fn test_list_recursive_with_pattern() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path());
        storage.write("a.yml", "").unwrap();
        storage.write("sub/b.yml", "").unwrap();
        storage.write("sub/c.txt", "").unwrap();

        assert_eq!(storage.list("*.yml").unwrap(), vec!["a.yml", "sub/b.yml"]);
        assert_eq!(storage.list("*").unwrap().len(), 3);
    }

    #[test]
    fn test_list_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir.path().join("nope"));

        assert!(storage.list("*").unwrap().is_empty());
    }

    #[test]
    fn test_delete_all_removes_files_and_directories() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path());
        storage.write("a.txt", "1").unwrap();
        storage.write("sub/deep/b.txt", "2").unwrap();

        let failures = storage.delete_all();

        assert!(failures.is_empty());
        assert!(storage.list("*").unwrap().is_empty());
    }

    #[test]
    fn test_copy_from_local_is_byte_exact() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        let source = LocalStorage::new(Role::Assets, src_dir.path().to_path_buf(), HashAlgorithm::Md5);
        let target = storage(dst_dir.path());
        source.write_bytes("img/logo.bin", &[0, 159, 146, 150]).unwrap();

        target.copy_from("img/logo.bin", &source, "img/logo.bin").unwrap();

        assert_eq!(target.read_bytes("img/logo.bin").unwrap(), vec![0, 159, 146, 150]);
    }

    #[test]
    fn test_is_writable_leaves_no_probe() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir.path().join("fresh"));

        storage.is_writable().unwrap();

        assert!(storage.list("*").unwrap().is_empty());
    }

    #[test]
    fn test_metrics_counts_matching_files() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path());
        storage.write("a.txt", "abc").unwrap();
        storage.write("sub/b.txt", "de").unwrap();
        storage.write("c.yml", "xyz").unwrap();

        let metrics = storage.metrics("*.txt");

        assert_eq!(metrics.file_count, 2);
        assert_eq!(metrics.total_bytes, 5);
        assert!(metrics.errors.is_empty());
    }

    #[test]
    fn test_local_storage_is_send_sync() {
        static_assertions::assert_impl_all!(LocalStorage: Send, Sync);
    }
}

//! Storage trait and error types.
//!
//! Provides the core [`Storage`] trait implemented by every backend, along with
//! [`StorageError`] for unified error handling across backends.
//!
//! # Path Convention
//!
//! All path parameters are **role-relative paths** using `/` separators:
//! - `"index.html"` - file at the root of the role
//! - `"docs/guide.yml"` - nested file
//!
//! Leading slashes are ignored and `..` components are rejected.

use std::path::{Path, PathBuf};

use crate::registry::Role;
use crate::version::{FileVersion, HashAlgorithm};

/// Semantic error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StorageErrorKind {
    /// Resource does not exist.
    NotFound,
    /// Permission denied.
    PermissionDenied,
    /// Resource already exists (for create operations).
    AlreadyExists,
    /// Invalid path or identifier.
    InvalidPath,
    /// Backend is temporarily unavailable.
    Unavailable,
    /// Operation timed out.
    Timeout,
    /// Operation is not supported by this backend (e.g. write on a read-only mount).
    Unsupported,
    /// External tool could not be run or exited with a failure.
    ToolInvocation,
    /// Backend configuration rejected at construction.
    InvalidConfig,
    /// Other/unknown error category.
    Other,
}

/// Retry guidance.
#[derive(Debug, PartialEq, Eq, Default)]
pub enum ErrorStatus {
    /// Don't retry (config error, not found, invalid path).
    #[default]
    Permanent,
    /// Retry immediately (timeout, connection reset).
    Temporary,
}

/// Storage error with semantic kind and backend-specific source.
#[derive(Debug)]
pub struct StorageError {
    /// Semantic error category.
    pub kind: StorageErrorKind,
    /// Retry guidance.
    pub status: ErrorStatus,
    /// Path context (if applicable).
    pub path: Option<PathBuf>,
    /// Backend identifier (e.g., "Local", "Memory").
    pub backend: Option<&'static str>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StorageError {
    /// Create a new storage error.
    #[must_use]
    pub fn new(kind: StorageErrorKind) -> Self {
        Self {
            kind,
            status: ErrorStatus::Permanent,
            path: None,
            backend: None,
            source: None,
        }
    }

    /// Attach path context.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach backend identifier.
    #[must_use]
    pub fn with_backend(mut self, backend: &'static str) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set retry status.
    #[must_use]
    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Attach the underlying error source.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach a plain message as the error source.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let message: String = message.into();
        self.source = Some(message.into());
        self
    }

    /// Downcast the source error to a concrete type.
    #[must_use]
    pub fn downcast_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.as_ref()?.downcast_ref()
    }

    /// Create a not found error with path.
    #[must_use]
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::new(StorageErrorKind::NotFound).with_path(path)
    }

    /// Create an error for an operation a read-only backend refuses.
    #[must_use]
    pub fn read_only(operation: &str) -> Self {
        Self::new(StorageErrorKind::Unsupported)
            .with_message(format!("{operation} is unsupported, backend is read-only"))
    }

    /// Create a storage error from an I/O error.
    #[must_use]
    pub fn io(err: std::io::Error, path: Option<PathBuf>) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
            std::io::ErrorKind::AlreadyExists => StorageErrorKind::AlreadyExists,
            std::io::ErrorKind::TimedOut => StorageErrorKind::Timeout,
            _ => StorageErrorKind::Other,
        };
        let status = match err.kind() {
            std::io::ErrorKind::TimedOut => ErrorStatus::Temporary,
            _ => ErrorStatus::Permanent,
        };
        let mut error = Self::new(kind).with_status(status).with_source(err);
        if let Some(p) = path {
            error = error.with_path(p);
        }
        error
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: "[Backend] Kind: message (path: foo/bar)"
        if let Some(backend) = self.backend {
            write!(f, "[{backend}] ")?;
        }

        let kind_str = match self.kind {
            StorageErrorKind::NotFound => "Not found",
            StorageErrorKind::PermissionDenied => "Permission denied",
            StorageErrorKind::AlreadyExists => "Already exists",
            StorageErrorKind::InvalidPath => "Invalid path",
            StorageErrorKind::Unavailable => "Unavailable",
            StorageErrorKind::Timeout => "Timeout",
            StorageErrorKind::Unsupported => "Unsupported",
            StorageErrorKind::ToolInvocation => "Tool invocation failed",
            StorageErrorKind::InvalidConfig => "Invalid configuration",
            StorageErrorKind::Other => "Error",
        };

        write!(f, "{kind_str}")?;

        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }

        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }

        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Backend variant bound to a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Host filesystem.
    Local,
    /// In-process expiring map.
    Memory,
    /// Read-only remote mount driven by `rclone`.
    Rclone,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Memory => "memory",
            Self::Rclone => "rclone",
        })
    }
}

/// File count and size totals for one backend.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StorageMetrics {
    /// Number of files matching the pattern.
    pub file_count: u64,
    /// Sum of file sizes in bytes.
    pub total_bytes: u64,
    /// Per-file failures encountered while collecting.
    pub errors: Vec<String>,
}

/// Uniform file operations over one role's root.
///
/// Implementations enforce their constraints (writability, copy direction,
/// supported hash algorithms) when constructed, so a backend that exists is
/// always usable for the role it was built for.
pub trait Storage: Send + Sync {
    /// Backend variant.
    fn kind(&self) -> BackendKind;

    /// Role this backend serves.
    fn role(&self) -> Role;

    /// Hash algorithm used by [`compute_version`](Self::compute_version).
    fn hash_algorithm(&self) -> HashAlgorithm;

    /// Root location as configured (directory, remote prefix, or memory label).
    fn root(&self) -> &str;

    /// Physical directory backing this role, for backends on the local disk.
    fn local_root(&self) -> Option<&Path> {
        None
    }

    /// Check whether a file exists.
    ///
    /// Returns `false` on errors (treats errors as "doesn't exist").
    fn exists(&self, path: &str) -> bool;

    /// Read a file as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`StorageErrorKind::NotFound`] if the file is absent.
    fn read(&self, path: &str) -> Result<String, StorageError> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes)
            .map_err(|e| StorageError::new(StorageErrorKind::Other).with_path(path).with_source(e))
    }

    /// Read a file as raw bytes.
    fn read_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Write text, creating parent structure as needed.
    fn write(&self, path: &str, content: &str) -> Result<(), StorageError> {
        self.write_bytes(path, content.as_bytes())
    }

    /// Write raw bytes, creating parent structure as needed.
    fn write_bytes(&self, path: &str, content: &[u8]) -> Result<(), StorageError>;

    /// Copy `path` from `source` into this backend at `target`.
    fn copy_from(&self, path: &str, source: &dyn Storage, target: &str)
    -> Result<(), StorageError>;

    /// Copy `path` from this backend into `destination` at `target`.
    ///
    /// The default reads the bytes and writes them through the destination.
    fn copy_to(
        &self,
        path: &str,
        destination: &dyn Storage,
        target: &str,
    ) -> Result<(), StorageError> {
        let bytes = self.read_bytes(path)?;
        destination.write_bytes(target, &bytes)
    }

    /// Snapshot the current version of a file.
    fn compute_version(&self, path: &str) -> Result<FileVersion, StorageError>;

    /// Check a recorded version against the file's current state.
    ///
    /// Size and modification time are always compared and a mismatch returns
    /// `false` without hashing. The hash is only recomputed when `with_hash`
    /// is set. A missing file compares as `false`.
    fn compare_version(&self, expected: &FileVersion, with_hash: bool) -> Result<bool, StorageError>;

    /// List role-relative paths matching a glob pattern, recursively.
    fn list(&self, pattern: &str) -> Result<Vec<String>, StorageError>;

    /// Delete one file.
    fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Delete everything under the root.
    ///
    /// Best-effort: continues past failures and returns each of them.
    fn delete_all(&self) -> Vec<StorageError>;

    /// Probe whether the backend accepts writes.
    fn is_writable(&self) -> Result<(), StorageError>;

    /// Count files and bytes matching a glob pattern.
    fn metrics(&self, pattern: &str) -> StorageMetrics;
}

/// Normalize a role-relative path, rejecting traversal.
///
/// Strips leading `/` and `./`, converts `\` to `/`.
pub(crate) fn normalize_path(path: &str, backend: &'static str) -> Result<String, StorageError> {
    let cleaned = path.replace('\\', "/");
    let mut parts = Vec::new();
    for part in cleaned.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                return Err(StorageError::new(StorageErrorKind::InvalidPath)
                    .with_path(path)
                    .with_backend(backend));
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return Err(StorageError::new(StorageErrorKind::InvalidPath)
            .with_path(path)
            .with_backend(backend));
    }
    Ok(parts.join("/"))
}

/// Compile a glob pattern for `list`/`metrics`.
pub(crate) fn compile_pattern(
    pattern: &str,
    backend: &'static str,
) -> Result<glob::Pattern, StorageError> {
    glob::Pattern::new(pattern).map_err(|e| {
        StorageError::new(StorageErrorKind::InvalidPath)
            .with_path(pattern)
            .with_backend(backend)
            .with_source(e)
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_storage_error_new() {
        let err = StorageError::new(StorageErrorKind::NotFound);

        assert_eq!(err.kind, StorageErrorKind::NotFound);
        assert_eq!(err.status, ErrorStatus::Permanent);
        assert!(err.path.is_none());
        assert!(err.backend.is_none());
    }

    #[test]
    fn test_storage_error_with_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = StorageError::new(StorageErrorKind::NotFound).with_source(io_err);

        assert!(err.downcast_source::<std::io::Error>().is_some());
    }

    #[test]
    fn test_storage_error_io_mapping() {
        let err = StorageError::io(
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            Some(PathBuf::from("a.txt")),
        );
        assert_eq!(err.kind, StorageErrorKind::PermissionDenied);
        assert_eq!(err.path.as_deref(), Some(Path::new("a.txt")));

        let err = StorageError::io(
            std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"),
            None,
        );
        assert_eq!(err.kind, StorageErrorKind::Timeout);
        assert_eq!(err.status, ErrorStatus::Temporary);
    }

    #[test]
    fn test_storage_error_read_only_display() {
        let err = StorageError::read_only("write")
            .with_backend("Rclone")
            .with_path("a.txt");

        assert_eq!(
            err.to_string(),
            "[Rclone] Unsupported: write is unsupported, backend is read-only (path: a.txt)"
        );
    }

    #[test]
    fn test_storage_error_display_simple() {
        let err = StorageError::new(StorageErrorKind::NotFound);

        assert_eq!(err.to_string(), "Not found");
    }

    #[test]
    fn test_storage_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StorageError>();
    }

    #[test]
    fn test_normalize_path_strips_leading_separators() {
        assert_eq!(normalize_path("/docs/./a.yml", "Test").unwrap(), "docs/a.yml");
        assert_eq!(normalize_path("docs\\b.yml", "Test").unwrap(), "docs/b.yml");
    }

    #[test]
    fn test_normalize_path_rejects_traversal() {
        let err = normalize_path("../etc/passwd", "Test").unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::InvalidPath);

        let err = normalize_path("/", "Test").unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::InvalidPath);
    }

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Local.to_string(), "local");
        assert_eq!(BackendKind::Rclone.to_string(), "rclone");
    }
}

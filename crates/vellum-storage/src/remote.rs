//! Read-only remote backend driven by the `rclone` command-line tool.
//!
//! Every operation is one blocking subprocess call. Nothing is cached, so a
//! version check always reflects the remote state at the time of the call.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::process::{Command, Output};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::registry::Role;
use crate::storage::{
    BackendKind, Storage, StorageError, StorageErrorKind, StorageMetrics, compile_pattern,
    normalize_path,
};
use crate::version::{FileVersion, HashAlgorithm};

/// Backend identifier for error messages.
const BACKEND: &str = "Rclone";

/// Options for [`RcloneStorage`], read from the role's free-form options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcloneOptions {
    /// Remote prefix prepended to the role root (e.g. `s3:`).
    pub remote: String,
    /// Prefix addressing the local filesystem in `copyto` (default `local:`).
    pub local: String,
    /// Executable to run (default `rclone`).
    pub binary: String,
}

impl Default for RcloneOptions {
    fn default() -> Self {
        Self {
            remote: String::new(),
            local: "local:".to_owned(),
            binary: "rclone".to_owned(),
        }
    }
}

impl RcloneOptions {
    /// Read `rclone_remote`, `rclone_local` and `rclone_binary` keys.
    #[must_use]
    pub fn from_map(options: &BTreeMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            remote: options.get("rclone_remote").cloned().unwrap_or(defaults.remote),
            local: options.get("rclone_local").cloned().unwrap_or(defaults.local),
            binary: options.get("rclone_binary").cloned().unwrap_or(defaults.binary),
        }
    }
}

/// One entry of `rclone lsjson` output.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsJsonEntry {
    size: i64,
    mod_time: String,
    #[serde(default)]
    is_dir: bool,
    #[serde(default)]
    hashes: HashMap<String, String>,
}

/// Parse `lsjson --stat` output, keeping only files.
fn parse_stat_entry(stdout: &[u8]) -> Result<Option<LsJsonEntry>, serde_json::Error> {
    let entry: LsJsonEntry = serde_json::from_slice(stdout)?;
    Ok((!entry.is_dir).then_some(entry))
}

/// Read-only storage on an rclone remote.
#[derive(Debug)]
pub struct RcloneStorage {
    role: Role,
    root: String,
    hash: HashAlgorithm,
    options: RcloneOptions,
}

impl RcloneStorage {
    /// Create a remote backend.
    ///
    /// # Errors
    ///
    /// Returns [`StorageErrorKind::InvalidConfig`] when `role` is not a source
    /// role or `hash` is neither MD5 nor SHA-1, the only digests rclone
    /// reports across remotes.
    pub fn new(
        role: Role,
        root: String,
        hash: HashAlgorithm,
        options: RcloneOptions,
    ) -> Result<Self, StorageError> {
        if !role.is_source() {
            return Err(StorageError::new(StorageErrorKind::InvalidConfig)
                .with_backend(BACKEND)
                .with_message(format!(
                    "rclone backend is only allowed for source roles \
                     (apis, assets, contents, pages, templates), not {role}"
                )));
        }
        if !matches!(hash, HashAlgorithm::Md5 | HashAlgorithm::Sha1) {
            return Err(StorageError::new(StorageErrorKind::InvalidConfig)
                .with_backend(BACKEND)
                .with_message(format!("hash {hash} is unsupported, use md5 or sha1")));
        }
        Ok(Self {
            role,
            root,
            hash,
            options,
        })
    }

    fn remote_root(&self) -> String {
        format!("{}{}", self.options.remote, self.root.trim_end_matches('/'))
    }

    fn remote_path(&self, path: &str) -> Result<(String, String), StorageError> {
        let name = normalize_path(path, BACKEND)?;
        let full = format!("{}/{name}", self.remote_root());
        Ok((name, full))
    }

    fn hash_type(&self) -> &'static str {
        match self.hash {
            HashAlgorithm::Sha1 => "SHA-1",
            _ => "MD5",
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output, StorageError> {
        tracing::debug!("{} {}", self.options.binary, args.join(" "));
        Command::new(&self.options.binary)
            .args(args)
            .output()
            .map_err(|e| {
                StorageError::new(StorageErrorKind::ToolInvocation)
                    .with_backend(BACKEND)
                    .with_source(e)
            })
    }

    fn run_ok(&self, args: &[&str], path: &str) -> Result<Vec<u8>, StorageError> {
        let output = self.run(args)?;
        if output.status.success() {
            return Ok(output.stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(StorageError::new(StorageErrorKind::ToolInvocation)
            .with_backend(BACKEND)
            .with_path(path)
            .with_message(format!(
                "{} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                stderr.trim()
            )))
    }

    fn stat(&self, path: &str, with_hash: bool) -> Result<Option<FileVersion>, StorageError> {
        let (name, full) = self.remote_path(path)?;
        let mut args = vec!["lsjson", "--stat", "--no-mimetype"];
        if with_hash {
            args.extend(["--hash", "--hash-type", self.hash_type()]);
        }
        args.push(&full);

        let output = self.run(&args)?;
        if !output.status.success() {
            return Ok(None);
        }
        let entry = parse_stat_entry(&output.stdout).map_err(|e| {
            StorageError::new(StorageErrorKind::ToolInvocation)
                .with_backend(BACKEND)
                .with_path(&full)
                .with_source(e)
        })?;
        let Some(entry) = entry else {
            return Ok(None);
        };

        let modified = DateTime::parse_from_rfc3339(&entry.mod_time)
            .map_err(|e| {
                StorageError::new(StorageErrorKind::ToolInvocation)
                    .with_backend(BACKEND)
                    .with_path(&full)
                    .with_source(e)
            })?
            .with_timezone(&Utc);
        let hash = if with_hash {
            entry
                .hashes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(self.hash_type()))
                .map(|(_, v)| v.to_ascii_lowercase())
                .unwrap_or_default()
        } else {
            String::new()
        };

        Ok(Some(FileVersion {
            name,
            hash,
            size: u64::try_from(entry.size).unwrap_or_default(),
            modified,
        }))
    }

    /// List (relative name, size) pairs for every file under the root.
    fn list_sized(&self) -> Result<Vec<(String, u64)>, StorageError> {
        let root = self.remote_root();
        let stdout = self.run_ok(
            &[
                "lsf",
                "--recursive",
                "--files-only",
                "--format",
                "sp",
                "--separator",
                ";",
                &root,
            ],
            &root,
        )?;
        Ok(parse_sized_listing(&String::from_utf8_lossy(&stdout)))
    }
}

/// Parse `lsf --format sp --separator ;` output.
fn parse_sized_listing(listing: &str) -> Vec<(String, u64)> {
    listing
        .lines()
        .filter_map(|line| {
            let (size, path) = line.split_once(';')?;
            Some((path.to_owned(), size.trim().parse().unwrap_or_default()))
        })
        .collect()
}

impl Storage for RcloneStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Rclone
    }

    fn role(&self) -> Role {
        self.role
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn exists(&self, path: &str) -> bool {
        matches!(self.stat(path, false), Ok(Some(_)))
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let (name, full) = self.remote_path(path)?;
        self.run_ok(&["cat", &full], &full).map_err(|e| {
            if self.exists(&name) {
                e
            } else {
                StorageError::not_found(name).with_backend(BACKEND)
            }
        })
    }

    fn write_bytes(&self, path: &str, _content: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::read_only("write")
            .with_backend(BACKEND)
            .with_path(path))
    }

    fn copy_from(
        &self,
        path: &str,
        _source: &dyn Storage,
        _target: &str,
    ) -> Result<(), StorageError> {
        Err(StorageError::read_only("copy")
            .with_backend(BACKEND)
            .with_path(path))
    }

    fn copy_to(
        &self,
        path: &str,
        destination: &dyn Storage,
        target: &str,
    ) -> Result<(), StorageError> {
        let Some(local_root) = destination.local_root() else {
            let bytes = self.read_bytes(path)?;
            return destination.write_bytes(target, &bytes);
        };
        let (_, full) = self.remote_path(path)?;
        let target = normalize_path(target, BACKEND)?;
        let local_target = format!("{}{}", self.options.local, local_root.join(target).display());
        self.run_ok(&["copyto", &full, &local_target], &full)?;
        Ok(())
    }

    fn compute_version(&self, path: &str) -> Result<FileVersion, StorageError> {
        self.stat(path, true)?
            .ok_or_else(|| StorageError::not_found(path).with_backend(BACKEND))
    }

    fn compare_version(&self, expected: &FileVersion, with_hash: bool) -> Result<bool, StorageError> {
        let Some(current) = self.stat(&expected.name, with_hash)? else {
            return Ok(false);
        };
        if !current.same_shape(expected) {
            return Ok(false);
        }
        Ok(!with_hash || current.hash == expected.hash)
    }

    fn list(&self, pattern: &str) -> Result<Vec<String>, StorageError> {
        let pattern = compile_pattern(pattern, BACKEND)?;
        let mut names: Vec<String> = self
            .list_sized()?
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| pattern.matches(name))
            .collect();
        names.sort();
        Ok(names)
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        Err(StorageError::read_only("delete")
            .with_backend(BACKEND)
            .with_path(path))
    }

    fn delete_all(&self) -> Vec<StorageError> {
        vec![
            StorageError::read_only("delete")
                .with_backend(BACKEND)
                .with_path(&self.root),
        ]
    }

    fn is_writable(&self) -> Result<(), StorageError> {
        Err(StorageError::read_only("write")
            .with_backend(BACKEND)
            .with_path(Path::new(&self.root)))
    }

    fn metrics(&self, pattern: &str) -> StorageMetrics {
        let listed = compile_pattern(pattern, BACKEND).and_then(|p| Ok((p, self.list_sized()?)));
        match listed {
            Ok((pattern, files)) => {
                let mut metrics = StorageMetrics::default();
                for (_, size) in files.iter().filter(|(name, _)| pattern.matches(name)) {
                    metrics.file_count += 1;
                    metrics.total_bytes += size;
                }
                metrics
            }
            Err(e) => StorageMetrics {
                errors: vec![e.to_string()],
                ..StorageMetrics::default()
            },
        }
    }
}

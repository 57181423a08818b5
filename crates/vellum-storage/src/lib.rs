//! Storage backends for the Vellum content cache.
//!
//! This crate provides the [`Storage`] trait and its three variants:
//!
//! - [`LocalStorage`]: host filesystem, writable, configurable hash algorithm
//! - [`MemoryStorage`]: in-process map with sliding expiry
//! - [`RcloneStorage`]: read-only remote mount driven by the `rclone` tool
//!
//! A [`PathRegistry`] binds each of the eight [`Role`]s to one backend and is
//! built once at startup.
//!
//! # Example
//!
//! ```ignore
//! use std::collections::BTreeMap;
//! use std::path::Path;
//! use std::sync::Arc;
//! use vellum_storage::{Clock, PathRegistry, SystemClock};
//!
//! let clock: Arc<dyn Clock> = Arc::new(SystemClock);
//! let registry = PathRegistry::build(&BTreeMap::new(), Path::new("."), &clock)?;
//! registry.public().write("index.html", "<h1>hi</h1>")?;
//! ```

mod expiry;
mod local;
mod memory;
mod registry;
mod remote;
mod storage;
mod version;

pub use expiry::{Clock, DEFAULT_TTL, ExpiringMap, ManualClock, SystemClock};
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use registry::{PathEntry, PathRegistry, Role, RoleConfig};
pub use remote::{RcloneOptions, RcloneStorage};
pub use storage::{
    BackendKind, ErrorStatus, Storage, StorageError, StorageErrorKind, StorageMetrics,
};
pub use version::{FileVersion, HashAlgorithm, UnknownHashAlgorithm};

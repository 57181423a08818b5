//! Incremental generation cache for Vellum.
//!
//! The [`Orchestrator`] resolves request paths to [`ResourceDescriptor`]s,
//! materializes pages, assets and APIs from their source roles into Public
//! and Private, and records a [`FileMetadata`] sidecar for each artifact so
//! staleness can be computed later:
//!
//! ```text
//! check_file("index.html")
//!   -> Unknown   (cached in Public)
//!   -> Page      (Pages/index.html.yml)    -> generate_page
//!   -> Asset     (Assets/index.html)       -> copy_asset
//!   -> NotFound
//! ```
//!
//! Sidecars are written by a background [`MetadataWriter`]; a request never
//! waits for them.

mod descriptor;
mod error;
mod metadata;
mod orchestrator;
mod process;
mod status;
mod writer;

pub use descriptor::{ApiType, PageDescriptor, ResourceDescriptor};
pub use error::CacheError;
pub use metadata::{ArtifactType, FileMetadata, sidecar_path};
pub use orchestrator::{Orchestrator, PublicFile};
pub use process::process_metrics;
pub use status::{
    DeletedEntry, EntryKind, EntryRef, FileStatusInfo, HealthCheck, StalenessStatus,
};
pub use writer::{DEFAULT_CAPACITY, MetadataWriter};

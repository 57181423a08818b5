//! Errors surfaced by orchestrator operations that report them.
//!
//! Generation, copy and deletion log their failures and return `false`;
//! these variants only reach callers of the operations returning `Result`.

use vellum_storage::{Role, StorageError};
use vellum_template::TemplateError;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    /// A page or content file is not valid YAML.
    #[error("invalid descriptor: {0}")]
    Descriptor(#[from] serde_yaml::Error),

    /// The role has no `update_command` configured.
    #[error("paths.{0}.update_command is not defined")]
    NoUpdateCommand(Role),

    /// The descriptor kind does not support the operation.
    #[error("{0} cannot be served from the public cache")]
    NotServable(String),
}

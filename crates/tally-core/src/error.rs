//! Error types for tally.

use thiserror::Error;

/// Top-level result type for tally operations.
pub type Result<T> = std::result::Result<T, TallyError>;

/// Top-level error type for tally.
#[derive(Debug, Error)]
pub enum TallyError {
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("project error: {0}")]
    Project(#[from] ProjectError),

    #[error("config error: {0}")]
    Config(String),

    #[error("vault error: {0}")]
    Vault(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Structural errors raised by the folder tree.
///
/// These abort the single operation that triggered them and leave the
/// tree unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("cannot move '{from}' to '{to}': target path is already tracked")]
    PathConflict { from: String, to: String },

    #[error("cannot move folder '{from}' into its own subtree '{to}'")]
    MoveIntoSelf { from: String, to: String },

    #[error("'{0}' is tracked as a folder, not a file")]
    NotAFile(String),

    #[error("'{0}' is tracked as a file, not a folder")]
    NotAFolder(String),

    #[error("the vault root cannot be renamed or deleted")]
    RootImmutable,
}

/// Errors related to project construction and registry updates.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectError {
    #[error("project '{name}' has no index file: '{index}' is not a tracked file")]
    MissingIndexFile { name: String, index: String },

    #[error("a project named '{0}' already exists")]
    DuplicateName(String),

    #[error("no project named '{0}'")]
    NotFound(String),

    #[error("project name must not be empty")]
    EmptyName,
}

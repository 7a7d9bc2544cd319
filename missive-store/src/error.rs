//! Error types for the missive-store crate.

use std::io;

use missive_common::RecordId;
use thiserror::Error;

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O operation failed (file read/write/rename).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found.
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    /// The record was changed by someone else since it was read.
    #[error("Version conflict for {id}: expected version {expected}, found {found}")]
    VersionConflict {
        id: RecordId,
        expected: u64,
        found: u64,
    },

    /// The store is full.
    #[error("Store capacity exceeded: {len}/{capacity} records")]
    CapacityExceeded { len: usize, capacity: usize },

    /// Store location validation failed.
    #[error("Store validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Internal error (lock poisoning, id exhaustion, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns `true` if re-reading the record and retrying could succeed.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// Store directory validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The path is relative.
    #[error("Store path must be absolute: {0}")]
    NotAbsolute(String),

    /// The path has `..` components.
    #[error("Store path cannot contain '..': {0}")]
    ParentTraversal(String),

    /// The path points into a system directory.
    #[error("Store path is inside a system directory: {0}")]
    SystemDirectory(String),

    /// The path exists but is not a directory.
    #[error("Store path is not a directory: {0}")]
    NotDirectory(String),

    /// No path was given to the builder.
    #[error("Store path is required")]
    MissingPath,
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{FileRecordStore, MemoryRecordStore, RecordStore};

/// Configuration for the record store
///
/// # Examples
///
/// File-backed store in RON config:
/// ```ron
/// Missive (
///     store: File(path: "/var/lib/missive/records"),
/// )
/// ```
///
/// Memory-backed store with a capacity limit:
/// ```ron
/// Missive (
///     store: Memory(capacity: Some(1000)),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum StoreConfig {
    /// One JSON document per record in `path`
    File { path: PathBuf },
    /// Records live in memory and are lost on restart
    Memory {
        #[serde(default)]
        capacity: Option<usize>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory { capacity: None }
    }
}

impl StoreConfig {
    /// Get the directory for file-backed stores, if applicable
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File { path } => Some(path),
            Self::Memory { .. } => None,
        }
    }

    /// Build the configured store
    ///
    /// # Errors
    /// If a file-backed store's directory is invalid or cannot be created
    pub fn into_store(self) -> crate::Result<Arc<dyn RecordStore>> {
        let store: Arc<dyn RecordStore> = match self {
            Self::File { path } => Arc::new(FileRecordStore::builder().path(path).build()?),
            Self::Memory { capacity: None } => Arc::new(MemoryRecordStore::new()),
            Self::Memory {
                capacity: Some(capacity),
            } => Arc::new(MemoryRecordStore::with_capacity(capacity)),
        };

        Ok(store)
    }
}

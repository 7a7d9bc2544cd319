//! Storage for delivery records
//!
//! Every backend implements [`RecordStore`]: upsert by id, lookup by id and
//! lookup by status. Saves are conditional on the record's `version`, so a
//! stale copy of a record can never overwrite a newer one.

pub mod backends;
pub mod config;
pub mod error;
mod id;
pub mod r#trait;

pub use backends::{FileRecordStore, FileRecordStoreBuilder, MemoryRecordStore, TestRecordStore};
pub use config::StoreConfig;
pub use error::{Result, StoreError, ValidationError};
pub use r#trait::RecordStore;

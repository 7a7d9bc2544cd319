//! Backend storage implementations
//!
//! - `memory`: In-memory storage for development and tests
//! - `test`: Memory storage with synchronization and fault injection helpers
//! - `file`: One JSON document per record in a directory

pub mod file;
pub mod memory;

pub use file::{FileRecordStore, FileRecordStoreBuilder};
pub use memory::MemoryRecordStore;
pub use test::TestRecordStore;

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use missive_common::{DeliveryRecord, DeliveryStatus, RecordId};

use crate::{
    StoreError,
    id::IdGenerator,
    r#trait::{RecordStore, next_version},
};

/// In-memory record store
///
/// Records live in a `HashMap` behind an `RwLock`; the write lock is held for
/// the whole version check and insert, which makes every save atomic.
/// Nothing survives a restart, so this is meant for development and tests.
///
/// # Capacity Management
/// An optional capacity caps the number of records. Inserting beyond it
/// fails with [`StoreError::CapacityExceeded`]; updating existing records
/// always works.
#[derive(Debug, Clone)]
pub struct MemoryRecordStore {
    pub(crate) records: Arc<RwLock<HashMap<RecordId, DeliveryRecord>>>,
    ids: Arc<IdGenerator>,
    /// Maximum number of records to store (None = unlimited)
    capacity: Option<usize>,
}

impl MemoryRecordStore {
    /// Create a new empty store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::default(),
            ids: Arc::default(),
            capacity: None,
        }
    }

    /// Create a new empty store that holds at most `capacity` records
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Get the current number of records
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the configured capacity (None = unlimited)
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Drop every record
    pub(crate) fn clear(&self) {
        self.records
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save(&self, record: &mut DeliveryRecord) -> crate::Result<RecordId> {
        let mut records = self.records.write()?;

        let (id, version) = match record.id {
            Some(id) => (id, next_version(id, record, records.get(&id))?),
            None => {
                if let Some(capacity) = self.capacity
                    && records.len() >= capacity
                {
                    return Err(StoreError::CapacityExceeded {
                        len: records.len(),
                        capacity,
                    });
                }

                (self.ids.next_id()?, record.version + 1)
            }
        };

        let mut stored = record.clone();
        stored.id = Some(id);
        stored.version = version;
        records.insert(id, stored);
        drop(records);

        record.id = Some(id);
        record.version = version;

        Ok(id)
    }

    async fn find_by_status(&self, status: DeliveryStatus) -> crate::Result<Vec<DeliveryRecord>> {
        let mut matching: Vec<_> = self
            .records
            .read()?
            .values()
            .filter(|record| record.status() == status)
            .cloned()
            .collect();

        // Ids are handed out in increasing order, so this is creation order
        matching.sort_by_key(|record| record.id);

        Ok(matching)
    }

    async fn read(&self, id: &RecordId) -> crate::Result<DeliveryRecord> {
        self.records
            .read()?
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }
}

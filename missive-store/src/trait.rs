use async_trait::async_trait;
use missive_common::{DeliveryRecord, DeliveryStatus, RecordId};

/// Durable storage for delivery records
///
/// Implementations only promise per-record atomicity: a reader sees either
/// the old or the new version of a record, never a mix.
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Insert or overwrite a record.
    ///
    /// A record without an id is inserted and given one. A record with an id
    /// replaces the stored copy only if both carry the same `version`. On
    /// success the id and the bumped version are written back into `record`.
    ///
    /// # Errors
    /// [`StoreError::NotFound`](crate::StoreError::NotFound) if the record
    /// has an id the store does not know, and
    /// [`StoreError::VersionConflict`](crate::StoreError::VersionConflict) if
    /// the stored copy has moved on since `record` was read.
    async fn save(&self, record: &mut DeliveryRecord) -> crate::Result<RecordId>;

    /// All records currently in `status`, in creation order.
    ///
    /// # Errors
    /// If the store cannot be read.
    async fn find_by_status(&self, status: DeliveryStatus) -> crate::Result<Vec<DeliveryRecord>>;

    /// Look up a single record.
    ///
    /// # Errors
    /// [`StoreError::NotFound`](crate::StoreError::NotFound) if there is no
    /// such record, or if the store cannot be read.
    async fn read(&self, id: &RecordId) -> crate::Result<DeliveryRecord>;
}

/// Check that `record` may replace `stored`, returning the next version.
pub(crate) fn next_version(
    id: RecordId,
    record: &DeliveryRecord,
    stored: Option<&DeliveryRecord>,
) -> crate::Result<u64> {
    let stored = stored.ok_or(crate::StoreError::NotFound(id))?;
    if stored.version != record.version {
        return Err(crate::StoreError::VersionConflict {
            id,
            expected: record.version,
            found: stored.version,
        });
    }

    Ok(record.version + 1)
}

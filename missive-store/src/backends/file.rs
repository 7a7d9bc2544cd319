use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use missive_common::{DeliveryRecord, DeliveryStatus, RecordId};
use tokio::{io::AsyncWriteExt, sync::Mutex};
use tracing::warn;

use crate::{
    StoreError, ValidationError,
    id::IdGenerator,
    r#trait::{RecordStore, next_version},
};

#[cfg(unix)]
const SYSTEM_DIRECTORIES: &[&str] = &[
    "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
];

#[cfg(not(unix))]
const SYSTEM_DIRECTORIES: &[&str] = &[];

/// File-backed record store
///
/// Each record is a JSON document named `<ULID>.json` inside one directory.
/// Writes go to a hidden temporary file which is synced and then renamed
/// over the target, so readers only ever see whole documents.
///
/// Saves from this process are serialized, which makes the version check
/// and the write a single step. Separate processes sharing a directory get
/// no such guarantee.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    path: PathBuf,
    ids: Arc<IdGenerator>,
    write_lock: Arc<Mutex<()>>,
}

/// Builder for [`FileRecordStore`]
#[derive(Debug, Default)]
pub struct FileRecordStoreBuilder {
    path: Option<PathBuf>,
}

impl FileRecordStoreBuilder {
    /// Directory to keep records in; created if missing
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Validate the path and create the directory
    ///
    /// # Errors
    /// If the path is relative, contains `..`, points into a system
    /// directory, or cannot be created as a directory.
    pub fn build(self) -> crate::Result<FileRecordStore> {
        let path = self.path.ok_or(ValidationError::MissingPath)?;
        validate_path(&path)?;

        if path.exists() && !path.is_dir() {
            return Err(ValidationError::NotDirectory(path.display().to_string()).into());
        }
        std::fs::create_dir_all(&path)?;

        Ok(FileRecordStore {
            path,
            ids: Arc::default(),
            write_lock: Arc::default(),
        })
    }
}

fn validate_path(path: &Path) -> Result<(), ValidationError> {
    let display = path.display().to_string();

    if !path.is_absolute() {
        return Err(ValidationError::NotAbsolute(display));
    }

    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ValidationError::ParentTraversal(display));
    }

    if SYSTEM_DIRECTORIES
        .iter()
        .any(|system| path.starts_with(system))
    {
        return Err(ValidationError::SystemDirectory(display));
    }

    Ok(())
}

impl FileRecordStore {
    #[must_use]
    pub fn builder() -> FileRecordStoreBuilder {
        FileRecordStoreBuilder::default()
    }

    /// The directory records are kept in
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record_path(&self, id: &RecordId) -> PathBuf {
        self.path.join(id.filename())
    }

    async fn load(&self, id: &RecordId) -> crate::Result<DeliveryRecord> {
        let bytes = match tokio::fs::read(self.record_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(*id));
            }
            Err(e) => return Err(e.into()),
        };

        let mut record: DeliveryRecord = serde_json::from_slice(&bytes)?;
        record.id = Some(*id);
        Ok(record)
    }

    async fn load_existing(&self, id: &RecordId) -> crate::Result<Option<DeliveryRecord>> {
        match self.load(id).await {
            Ok(record) => Ok(Some(record)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write_atomic(&self, id: &RecordId, record: &DeliveryRecord) -> crate::Result<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        let temp = self.path.join(format!(".{}.tmp", id.filename()));

        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp, self.record_path(id)).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn save(&self, record: &mut DeliveryRecord) -> crate::Result<RecordId> {
        let _guard = self.write_lock.lock().await;

        let (id, version) = match record.id {
            Some(id) => {
                let stored = self.load_existing(&id).await?;
                (id, next_version(id, record, stored.as_ref())?)
            }
            None => (self.ids.next_id()?, record.version + 1),
        };

        let mut stored = record.clone();
        stored.id = Some(id);
        stored.version = version;
        self.write_atomic(&id, &stored).await?;

        record.id = Some(id);
        record.version = version;

        Ok(id)
    }

    async fn find_by_status(&self, status: DeliveryStatus) -> crate::Result<Vec<DeliveryRecord>> {
        let mut entries = tokio::fs::read_dir(&self.path).await?;
        let mut matching = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let Some(id) = entry.file_name().to_str().and_then(RecordId::from_filename) else {
                continue;
            };

            match self.load(&id).await {
                Ok(record) if record.status() == status => matching.push(record),
                Ok(_) | Err(StoreError::NotFound(_)) => {}
                Err(e) => {
                    warn!(record_id = %id, error = %e, "Skipping unreadable record");
                }
            }
        }

        matching.sort_by_key(|record| record.id);
        Ok(matching)
    }

    async fn read(&self, id: &RecordId) -> crate::Result<DeliveryRecord> {
        self.load(id).await
    }
}

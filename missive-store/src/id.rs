use std::sync::Mutex;

use missive_common::RecordId;

use crate::StoreError;

/// Hands out strictly increasing record ids, so creation order is id order
pub struct IdGenerator {
    inner: Mutex<ulid::Generator>,
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self {
            inner: Mutex::new(ulid::Generator::new()),
        }
    }
}

impl IdGenerator {
    pub fn next_id(&self) -> crate::Result<RecordId> {
        self.inner
            .lock()?
            .generate()
            .map(RecordId::new)
            .map_err(|e| StoreError::Internal(format!("Unable to generate record id: {e}")))
    }
}

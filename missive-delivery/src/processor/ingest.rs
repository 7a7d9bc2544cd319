use missive_common::{DeliveryRecord, EmailMessage};
use tracing::debug;

use crate::{error::DeliveryError, processor::DeliveryProcessor};

impl DeliveryProcessor {
    /// Record a new delivery and make the first attempt.
    ///
    /// The record is saved as `PENDING` before anything is sent, so a crash
    /// between the two leaves a trace. The returned record reflects the
    /// first attempt; a failed send is not an error here.
    ///
    /// # Errors
    /// If the record cannot be saved before or after the attempt
    #[tracing::instrument(level = "debug", skip_all, fields(recipient = %message.recipient))]
    pub async fn ingest(&self, message: EmailMessage) -> Result<DeliveryRecord, DeliveryError> {
        let mut record = DeliveryRecord::new(message);
        let id = self.store.save(&mut record).await?;

        debug!(record_id = %id, "Created delivery record");

        self.attempt(&mut record).await?;

        Ok(record)
    }
}

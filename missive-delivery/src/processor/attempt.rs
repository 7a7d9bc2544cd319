//! A single send attempt

use missive_common::DeliveryRecord;
use tracing::{debug, info, warn};

use crate::{
    error::{DeliveryError, TransportError},
    processor::DeliveryProcessor,
};

/// What happened to a record during [`DeliveryProcessor::attempt`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The transport accepted the message; the record is `SENT`
    Sent,
    /// The transport refused the message; the record is `FAILED`
    Failed(TransportError),
    /// The record was already terminal, nothing was sent or written
    Skipped,
}

impl DeliveryProcessor {
    /// Send `record` once and persist the outcome.
    ///
    /// Transport failures are recorded on the record and are not errors.
    /// `SENT` and `DEAD` records are left alone.
    ///
    /// When saving fails `record` still reflects the attempt, but the store
    /// keeps its previous state.
    ///
    /// # Errors
    /// If the outcome cannot be saved, including when the stored record was
    /// changed by someone else in the meantime.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(record_id = ?record.id, recipient = %record.recipient())
    )]
    pub async fn attempt(
        &self,
        record: &mut DeliveryRecord,
    ) -> Result<AttemptOutcome, DeliveryError> {
        if record.is_terminal() {
            debug!(status = %record.status(), "Record is final, not sending");
            return Ok(AttemptOutcome::Skipped);
        }

        let result = self
            .transport
            .send(record.recipient(), record.subject(), record.content())
            .await;

        let outcome = match result {
            Ok(()) => {
                record.record_success();
                info!(attempts = record.attempts(), "Email sent successfully");
                AttemptOutcome::Sent
            }
            Err(e) => {
                record.record_failure(e.to_string());
                warn!(
                    attempts = record.attempts(),
                    error = %e,
                    "Email sending failed"
                );
                AttemptOutcome::Failed(e)
            }
        };

        self.store.save(record).await?;

        Ok(outcome)
    }
}

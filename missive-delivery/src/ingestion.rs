//! Inbound message handling
//!
//! Payloads arrive as JSON objects with `recipient` (or `to`), `subject` and
//! `content` string fields. Anything else in the object is ignored. Payloads
//! that do not decode are dropped here and never become records.

use std::sync::Arc;

use missive_common::{DeliveryRecord, EmailMessage, Signal, internal};
use tokio::{
    sync::{Semaphore, broadcast, mpsc},
    task::JoinSet,
};
use tracing::{debug, error, info, warn};

use crate::{
    error::IngestError,
    processor::{DeliveryConfig, DeliveryProcessor},
};

/// Feeds inbound payloads to the [`DeliveryProcessor`]
#[derive(Debug, Clone)]
pub struct IngestionAdapter {
    processor: Arc<DeliveryProcessor>,
    max_concurrent: usize,
}

impl IngestionAdapter {
    pub fn new(processor: Arc<DeliveryProcessor>, config: &DeliveryConfig) -> Self {
        Self {
            processor,
            max_concurrent: config
                .max_concurrent_ingestions
                .clamp(1, DeliveryConfig::MAX_LIMIT),
        }
    }

    /// Parse a payload into a message
    ///
    /// # Errors
    /// If the payload is not a JSON message or the recipient is blank
    pub fn decode(payload: &[u8]) -> Result<EmailMessage, IngestError> {
        let message: EmailMessage = serde_json::from_slice(payload)?;

        if message.recipient.trim().is_empty() {
            return Err(IngestError::MissingField("recipient"));
        }

        Ok(message)
    }

    /// Decode a payload and ingest it
    ///
    /// # Errors
    /// If the payload is malformed or the record cannot be saved
    pub async fn handle(&self, payload: &[u8]) -> Result<DeliveryRecord, IngestError> {
        let message = Self::decode(payload)?;
        Ok(self.processor.ingest(message).await?)
    }

    async fn handle_logged(&self, payload: &[u8]) {
        match self.handle(payload).await {
            Ok(record) => debug!(
                record_id = ?record.id,
                status = %record.status(),
                "Ingested message"
            ),
            Err(e) if e.is_rejection() => warn!(error = %e, "Dropping malformed message"),
            Err(e) => error!(error = %e, "Unable to ingest message"),
        }
    }

    /// Consume payloads from `inbound` until it closes or shutdown is signalled.
    ///
    /// At most `max_concurrent_ingestions` payloads are processed at once;
    /// beyond that the channel fills up and producers wait. Shutdown is
    /// honoured while waiting for a free worker. Ingestions already running
    /// when the loop ends are allowed to finish; payloads still queued are
    /// dropped and counted in the log.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn serve(
        &self,
        mut inbound: mpsc::Receiver<Vec<u8>>,
        mut shutdown: broadcast::Receiver<Signal>,
    ) {
        internal!(
            "Ingestion adapter starting with {} workers",
            self.max_concurrent
        );

        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                payload = inbound.recv() => {
                    let Some(payload) = payload else {
                        internal!("Inbound channel closed");
                        break;
                    };

                    let permit = tokio::select! {
                        permit = Arc::clone(&permits).acquire_owned() => permit,
                        sig = shutdown.recv() => {
                            Self::stopping(sig, inbound.len() + 1);
                            break;
                        }
                    };
                    let Ok(permit) = permit else {
                        break;
                    };

                    let adapter = self.clone();
                    tasks.spawn(async move {
                        adapter.handle_logged(&payload).await;
                        drop(permit);
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Ingestion task failed: {e}");
                    }
                }
                sig = shutdown.recv() => {
                    Self::stopping(sig, inbound.len());
                    break;
                }
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for in-flight ingestions");
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Ingestion task failed: {e}");
            }
        }

        internal!("Ingestion adapter shutdown complete");
    }

    fn stopping(sig: Result<Signal, broadcast::error::RecvError>, queued: usize) {
        match sig {
            Ok(Signal::Shutdown) => {
                internal!("Ingestion adapter received shutdown signal");
            }
            Err(e) => {
                error!("Ingestion adapter shutdown channel error: {e}");
            }
        }

        if queued > 0 {
            warn!(queued, "Dropping queued messages that were never ingested");
        }
    }
}

//! Delivery processor: ingestion and single send attempts

mod attempt;
mod ingest;

use std::{sync::Arc, time::Duration};

use missive_store::RecordStore;
use serde::Deserialize;
use tokio::sync::Semaphore;

pub use self::attempt::AttemptOutcome;
use crate::{error::DeliveryError, transport::MailTransport};

const fn default_max_attempts() -> u32 {
    3
}

const fn default_retry_interval() -> u64 {
    300 // 5 minutes
}

const fn default_max_concurrent_ingestions() -> usize {
    16
}

const fn default_ingest_queue_size() -> usize {
    1024
}

/// Delivery and retry settings, read once at startup
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeliveryConfig {
    /// Attempts allowed before a record is dead-lettered
    ///
    /// Default: 3
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between the end of one retry sweep and the start of the next (in seconds)
    ///
    /// Default: 300 seconds (5 minutes)
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Inbound messages processed at the same time
    ///
    /// Default: 16
    #[serde(default = "default_max_concurrent_ingestions")]
    pub max_concurrent_ingestions: usize,

    /// Inbound messages buffered before producers are made to wait
    ///
    /// Default: 1024
    #[serde(default = "default_ingest_queue_size")]
    pub ingest_queue_size: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_interval_secs: default_retry_interval(),
            max_concurrent_ingestions: default_max_concurrent_ingestions(),
            ingest_queue_size: default_ingest_queue_size(),
        }
    }
}

impl DeliveryConfig {
    /// Largest worker count or queue size tokio can back with permits
    pub const MAX_LIMIT: usize = Semaphore::MAX_PERMITS;

    /// Check every value is usable
    ///
    /// # Errors
    /// If any limit or interval is zero, or a worker count or queue size is
    /// above [`Self::MAX_LIMIT`]
    pub fn validate(&self) -> Result<(), DeliveryError> {
        let zero = [
            ("max_attempts", u64::from(self.max_attempts)),
            ("retry_interval_secs", self.retry_interval_secs),
            (
                "max_concurrent_ingestions",
                self.max_concurrent_ingestions as u64,
            ),
            ("ingest_queue_size", self.ingest_queue_size as u64),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);

        if let Some((field, _)) = zero {
            return Err(DeliveryError::Configuration(format!(
                "{field} must be at least 1"
            )));
        }

        let oversized = [
            ("max_concurrent_ingestions", self.max_concurrent_ingestions),
            ("ingest_queue_size", self.ingest_queue_size),
        ]
        .into_iter()
        .find(|(_, value)| *value > Self::MAX_LIMIT);

        match oversized {
            Some((field, _)) => Err(DeliveryError::Configuration(format!(
                "{field} must be at most {}",
                Self::MAX_LIMIT
            ))),
            None => Ok(()),
        }
    }

    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

/// Turns inbound messages into delivery records and performs send attempts
///
/// The processor never retries on its own; a failed attempt leaves the
/// record `FAILED` for the [`RetryScheduler`](crate::RetryScheduler).
#[derive(Debug, Clone)]
pub struct DeliveryProcessor {
    store: Arc<dyn RecordStore>,
    transport: Arc<dyn MailTransport>,
}

impl DeliveryProcessor {
    pub fn new(store: Arc<dyn RecordStore>, transport: Arc<dyn MailTransport>) -> Self {
        Self { store, transport }
    }

    /// The store records are kept in
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }
}

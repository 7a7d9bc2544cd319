//! Email delivery with at-least-once semantics
//!
//! This crate provides functionality to:
//! - Turn inbound "send this email" payloads into durable delivery records
//! - Attempt delivery through a pluggable mail transport
//! - Periodically retry failed deliveries and dead-letter the hopeless ones

mod error;
mod ingestion;
mod processor;
mod scheduler;
pub mod transport;

pub use error::{DeliveryError, IngestError, TransportError};
pub use ingestion::IngestionAdapter;
pub use missive_common::{DeliveryRecord, DeliveryStatus, EmailMessage};
pub use processor::{AttemptOutcome, DeliveryConfig, DeliveryProcessor};
pub use scheduler::{RetryScheduler, SweepReport};
pub use transport::{MailTransport, TransportConfig};

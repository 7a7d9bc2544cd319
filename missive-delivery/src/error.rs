//! Typed error handling for delivery operations.
//!
//! Transport errors never escape the processor; they are written into the
//! delivery record instead. What does escape is infrastructure trouble:
//! - Store failures while recording an attempt
//! - Bad configuration at startup
//! - Malformed inbound payloads, rejected before any record exists

use missive_store::StoreError;
use thiserror::Error;

/// Operational failure while processing a delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The record store could not be read or written.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A delivery task panicked or was cancelled.
    #[error("Delivery task failed: {0}")]
    Task(String),
}

impl DeliveryError {
    /// Returns `true` if the record was changed concurrently and should be re-read.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }
}

/// A failed send, as reported by a mail transport.
///
/// The `Display` form is `<kind>: <reason>`, which is exactly what ends up
/// in a record's error message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The recipient or sender address could not be parsed.
    #[error("InvalidAddress: {0}")]
    InvalidAddress(String),

    /// The message could not be assembled.
    #[error("InvalidMessage: {0}")]
    InvalidMessage(String),

    /// Failed to reach the mail server.
    #[error("ConnectionFailed: {0}")]
    ConnectionFailed(String),

    /// The mail server took too long.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// TLS negotiation failed.
    #[error("Tls: {0}")]
    Tls(String),

    /// The mail server refused the message permanently (5xx).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The mail server refused the message for now (4xx).
    #[error("TemporaryFailure: {0}")]
    TemporaryFailure(String),
}

impl TransportError {
    /// Machine-readable failure class
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidAddress(_) => "InvalidAddress",
            Self::InvalidMessage(_) => "InvalidMessage",
            Self::ConnectionFailed(_) => "ConnectionFailed",
            Self::Timeout(_) => "Timeout",
            Self::Tls(_) => "Tls",
            Self::Rejected(_) => "Rejected",
            Self::TemporaryFailure(_) => "TemporaryFailure",
        }
    }

    /// Human-readable reason
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::InvalidAddress(reason)
            | Self::InvalidMessage(reason)
            | Self::ConnectionFailed(reason)
            | Self::Timeout(reason)
            | Self::Tls(reason)
            | Self::Rejected(reason)
            | Self::TemporaryFailure(reason) => reason,
        }
    }

    /// Returns `true` if retrying the same send is pointless.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress(_) | Self::InvalidMessage(_) | Self::Rejected(_)
        )
    }
}

/// Why an inbound payload did not become a delivery.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The payload is not a valid message.
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A required field is empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The payload was fine but recording it failed.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl IngestError {
    /// Returns `true` if the payload itself was at fault.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::MissingField(_))
    }
}

//! Mail transports
//!
//! A transport takes one message and either hands it off or says why it
//! could not. It never queues or retries on its own; that is the retry
//! scheduler's job.

mod log;
mod mock;
mod smtp;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

pub use self::{
    log::LogTransport,
    mock::{MockTransport, SentMail},
    smtp::{SmtpConfig, SmtpSecurity, SmtpTransport},
};
use crate::error::{DeliveryError, TransportError};

/// Something that can send an email
#[async_trait]
pub trait MailTransport: Send + Sync + std::fmt::Debug {
    /// Send a plain-text email, returning once the transport has accepted
    /// or refused it.
    ///
    /// # Errors
    /// A [`TransportError`] describing why the message was not sent
    async fn send(&self, recipient: &str, subject: &str, content: &str)
    -> Result<(), TransportError>;
}

/// Which transport to deliver with
///
/// # Examples
///
/// ```ron
/// Missive (
///     transport: Smtp(relay: "smtp.example.com", from: "noreply@example.com"),
/// )
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub enum TransportConfig {
    /// Log every message and report success
    #[default]
    Log,
    /// Relay through an SMTP server
    Smtp(SmtpConfig),
}

impl TransportConfig {
    /// Build the configured transport
    ///
    /// # Errors
    /// If the SMTP relay or sender address is invalid
    pub fn into_transport(self) -> Result<Arc<dyn MailTransport>, DeliveryError> {
        let transport: Arc<dyn MailTransport> = match self {
            Self::Log => Arc::new(LogTransport),
            Self::Smtp(config) => Arc::new(SmtpTransport::new(&config)?),
        };

        Ok(transport)
    }
}

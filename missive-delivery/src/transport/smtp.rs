use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use serde::Deserialize;
use tracing::debug;

use super::MailTransport;
use crate::error::{DeliveryError, TransportError};

const fn default_timeout() -> u64 {
    30
}

/// How to secure the connection to the relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS (port 587 by default)
    #[default]
    StartTls,
    /// TLS from the first byte (port 465 by default)
    Tls,
    /// No encryption at all (port 25 by default); only for local relays
    None,
}

/// SMTP relay settings
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// Relay host name
    pub relay: String,

    /// Relay port, defaulting to the standard port for `security`
    #[serde(default)]
    pub port: Option<u16>,

    /// Sender address for every message
    pub from: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub security: SmtpSecurity,

    /// Timeout for each SMTP command, in seconds
    ///
    /// Default: 30 seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Sends mail through an SMTP relay
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpTransport {
    /// Set up a relay connection pool
    ///
    /// No connection is made until the first send.
    ///
    /// # Errors
    /// If the sender address or relay host is invalid, or only one of
    /// username and password is set
    pub fn new(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let from: Mailbox = config.from.parse().map_err(|e| {
            DeliveryError::Configuration(format!("Invalid sender address {}: {e}", config.from))
        })?;

        let relay_error = |e: lettre::transport::smtp::Error| {
            DeliveryError::Configuration(format!("Invalid SMTP relay {}: {e}", config.relay))
        };

        let mut builder = match config.security {
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.relay)
                    .map_err(relay_error)?
            }
            SmtpSecurity::Tls => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.relay).map_err(relay_error)?
            }
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.relay.as_str())
            }
        }
        .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let Some(port) = config.port {
            builder = builder.port(port);
        }

        match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
            }
            (None, None) => {}
            _ => {
                return Err(DeliveryError::Configuration(
                    "SMTP username and password must be set together".to_string(),
                ));
            }
        }

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }

    fn build_message(
        &self,
        recipient: &str,
        subject: &str,
        content: &str,
    ) -> Result<Message, TransportError> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| TransportError::InvalidAddress(format!("{recipient}: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(content.to_string())
            .map_err(|e| TransportError::InvalidMessage(e.to_string()))
    }
}

/// Sort a lettre failure into our error kinds
fn classify(error: &lettre::transport::smtp::Error) -> TransportError {
    let reason = error.to_string();

    if error.is_timeout() {
        TransportError::Timeout(reason)
    } else if error.is_tls() {
        TransportError::Tls(reason)
    } else if error.is_permanent() {
        TransportError::Rejected(reason)
    } else if error.is_transient() {
        TransportError::TemporaryFailure(reason)
    } else {
        TransportError::ConnectionFailed(reason)
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        content: &str,
    ) -> Result<(), TransportError> {
        let message = self.build_message(recipient, subject, content)?;

        let response = self
            .mailer
            .send(message)
            .await
            .map_err(|e| classify(&e))?;

        debug!(
            recipient,
            code = %response.code(),
            "Relay accepted message"
        );

        Ok(())
    }
}

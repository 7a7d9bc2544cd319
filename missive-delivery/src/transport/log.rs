use async_trait::async_trait;
use tracing::info;

use super::MailTransport;
use crate::error::TransportError;

/// Logs messages instead of sending them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        content: &str,
    ) -> Result<(), TransportError> {
        info!(
            recipient,
            subject,
            content_len = content.len(),
            "Not sending email, log transport configured"
        );
        Ok(())
    }
}

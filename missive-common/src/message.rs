use serde::{Deserialize, Serialize};

/// An inbound "send this email" request
///
/// Unknown fields are ignored so producers can add to the payload freely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    #[serde(alias = "to")]
    pub recipient: String,
    pub subject: String,
    pub content: String,
}

impl EmailMessage {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            content: content.into(),
        }
    }
}

//! The delivery record and its identifier

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DeliveryStatus, EmailMessage};

/// Identifier for a stored delivery record
///
/// A ULID, so identifiers sort by creation time and double as file names
/// for file-backed stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    id: ulid::Ulid,
}

impl RecordId {
    /// Create a record ID from a ULID
    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self { id }
    }

    /// Generate a fresh, non-monotonic ID
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }

    /// Parse a record ID from a file name like `01ARZ3NDEKTSV4RRFFQ69G5FAV.json`
    ///
    /// Anything containing path separators or traversal patterns is rejected.
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return None;
        }

        let stem = filename.strip_suffix(".json")?;
        let id = ulid::Ulid::from_string(stem).ok()?;

        Some(Self { id })
    }

    /// The file name this record is stored under
    #[must_use]
    pub fn filename(&self) -> String {
        format!("{}.json", self.id)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl std::str::FromStr for RecordId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(Self::new)
    }
}

impl serde::Serialize for RecordId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
        Ok(Self { id })
    }
}

/// Durable state for one email send request
///
/// The only way to change `status`, `attempts` and `error_message` is via
/// [`record_success`](Self::record_success), [`record_failure`](Self::record_failure)
/// and [`mark_dead`](Self::mark_dead), which keep them consistent with each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    /// Assigned by the store on first save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    recipient: String,
    subject: String,
    content: String,
    status: DeliveryStatus,
    attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    last_attempt_time: DateTime<Utc>,
    /// Bumped by the store on every successful save
    #[serde(default)]
    pub version: u64,
}

impl DeliveryRecord {
    /// A fresh `PENDING` record with no attempts
    #[must_use]
    pub fn new(message: EmailMessage) -> Self {
        Self {
            id: None,
            recipient: message.recipient,
            subject: message.subject,
            content: message.content,
            status: DeliveryStatus::Pending,
            attempts: 0,
            error_message: None,
            last_attempt_time: Utc::now(),
            version: 0,
        }
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub const fn status(&self) -> DeliveryStatus {
        self.status
    }

    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub const fn last_attempt_time(&self) -> DateTime<Utc> {
        self.last_attempt_time
    }

    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the attempt ceiling has been reached
    pub const fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.attempts >= max_attempts
    }

    /// Apply the outcome of a successful send.
    ///
    /// Returns `false`, leaving the record untouched, if the record is terminal.
    pub fn record_success(&mut self) -> bool {
        if !self.status.can_transition_to(DeliveryStatus::Sent) {
            return false;
        }

        self.status = DeliveryStatus::Sent;
        self.error_message = None;
        self.finish_attempt();
        true
    }

    /// Apply the outcome of a failed send.
    ///
    /// Returns `false`, leaving the record untouched, if the record is terminal.
    pub fn record_failure(&mut self, error: impl Into<String>) -> bool {
        if !self.status.can_transition_to(DeliveryStatus::Failed) {
            return false;
        }

        let mut error = error.into();
        if error.trim().is_empty() {
            error = String::from("Unknown: no reason given");
        }

        self.status = DeliveryStatus::Failed;
        self.error_message = Some(error);
        self.finish_attempt();
        true
    }

    /// Abandon a failed record.
    ///
    /// Only `FAILED` records that have reached `max_attempts` may be
    /// dead-lettered; anything else is left alone and `false` is returned.
    pub fn mark_dead(&mut self, max_attempts: u32) -> bool {
        if !self.status.can_transition_to(DeliveryStatus::Dead) || !self.is_exhausted(max_attempts)
        {
            return false;
        }

        self.status = DeliveryStatus::Dead;
        true
    }

    fn finish_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt_time = Utc::now();
    }
}

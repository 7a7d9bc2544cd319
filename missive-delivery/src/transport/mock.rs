use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;

use super::MailTransport;
use crate::error::TransportError;

/// A message handed to [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub recipient: String,
    pub subject: String,
    pub content: String,
}

#[derive(Debug)]
struct Script {
    queued: VecDeque<Result<(), TransportError>>,
    fallback: Result<(), TransportError>,
    calls: Vec<SentMail>,
}

/// Scripted transport for tests
///
/// Outcomes queued with [`then_fail`](Self::then_fail) and
/// [`then_succeed`](Self::then_succeed) are used first, in order; once they
/// run out every call gets the fallback outcome. Every call is recorded.
#[derive(Debug, Clone)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::succeeding()
    }
}

impl MockTransport {
    fn with_fallback(fallback: Result<(), TransportError>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                queued: VecDeque::new(),
                fallback,
                calls: Vec::new(),
            })),
        }
    }

    /// A transport that accepts everything
    pub fn succeeding() -> Self {
        Self::with_fallback(Ok(()))
    }

    /// A transport that refuses everything with `error`
    pub fn failing(error: TransportError) -> Self {
        Self::with_fallback(Err(error))
    }

    /// Queue a failure for the next unscripted call
    #[must_use]
    pub fn then_fail(self, error: TransportError) -> Self {
        self.lock().queued.push_back(Err(error));
        self
    }

    /// Queue a success for the next unscripted call
    #[must_use]
    pub fn then_succeed(self) -> Self {
        self.lock().queued.push_back(Ok(()));
        self
    }

    /// Every message passed to `send`, in call order
    pub fn calls(&self) -> Vec<SentMail> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        content: &str,
    ) -> Result<(), TransportError> {
        let mut script = self.lock();
        script.calls.push(SentMail {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            content: content.to_string(),
        });

        let fallback = script.fallback.clone();
        script.queued.pop_front().unwrap_or(fallback)
    }
}

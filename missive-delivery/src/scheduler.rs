//! Periodic retry of failed deliveries
//!
//! Every sweep loads the `FAILED` records, dead-letters the ones that have
//! used up their attempts and gives the rest one more attempt. Sweeps never
//! overlap: the next one starts a full interval after the previous finished.

use std::{sync::Arc, time::Duration};

use missive_common::{DeliveryRecord, DeliveryStatus, Signal, internal};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    error::DeliveryError,
    processor::{AttemptOutcome, DeliveryConfig, DeliveryProcessor},
};

/// Counts from a single sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// `FAILED` records found
    pub examined: usize,
    pub sent: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// Records that turned terminal before we got to them
    pub skipped: usize,
    /// Records that could not be processed, plus a failed query
    pub errors: usize,
}

impl SweepReport {
    /// Whether the sweep had nothing to do
    pub const fn is_empty(&self) -> bool {
        self.examined == 0 && self.errors == 0
    }

    const fn tally(&mut self, outcome: &AttemptOutcome) {
        match outcome {
            AttemptOutcome::Sent => self.sent += 1,
            AttemptOutcome::Failed(_) => self.failed += 1,
            AttemptOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// What happened to one record during a sweep
enum Retry {
    DeadLettered,
    Attempted(AttemptOutcome),
}

/// Drives `FAILED` records forward until they are `SENT` or `DEAD`
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    processor: Arc<DeliveryProcessor>,
    max_attempts: u32,
    interval: Duration,
}

impl RetryScheduler {
    pub fn new(processor: Arc<DeliveryProcessor>, config: &DeliveryConfig) -> Self {
        Self {
            processor,
            max_attempts: config.max_attempts,
            interval: config.retry_interval(),
        }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay between the end of one sweep and the start of the next
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one pass over the `FAILED` records.
    ///
    /// Records are handled one at a time, in store order. A record that
    /// cannot be processed is logged and counted in
    /// [`SweepReport::errors`]; it never stops the sweep.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let records = match self
            .processor
            .store()
            .find_by_status(DeliveryStatus::Failed)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Unable to load failed emails");
                report.errors += 1;
                return report;
            }
        };

        if records.is_empty() {
            debug!("No failed emails to retry");
            return report;
        }

        info!(count = records.len(), "Retrying failed emails");

        for record in records {
            report.examined += 1;
            let record_id = record.id;

            match self.retry(record).await {
                Ok(Retry::DeadLettered) => report.dead_lettered += 1,
                Ok(Retry::Attempted(outcome)) => report.tally(&outcome),
                Err(e) if e.is_conflict() => {
                    warn!(
                        record_id = ?record_id,
                        "Record changed during retry, leaving it for the next sweep"
                    );
                    report.errors += 1;
                }
                Err(e) => {
                    error!(record_id = ?record_id, error = %e, "Unable to retry email");
                    report.errors += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            sent = report.sent,
            failed = report.failed,
            dead_lettered = report.dead_lettered,
            errors = report.errors,
            "Retry sweep complete"
        );

        report
    }

    async fn retry(&self, mut record: DeliveryRecord) -> Result<Retry, DeliveryError> {
        if record.is_exhausted(self.max_attempts) {
            if !record.mark_dead(self.max_attempts) {
                return Ok(Retry::Attempted(AttemptOutcome::Skipped));
            }

            self.processor.store().save(&mut record).await?;
            warn!(
                record_id = ?record.id,
                recipient = %record.recipient(),
                attempts = record.attempts(),
                error = record.error_message().unwrap_or_default(),
                "Email is undeliverable, giving up"
            );
            return Ok(Retry::DeadLettered);
        }

        // Each attempt runs in its own task so a panicking transport only
        // costs this record.
        let processor = Arc::clone(&self.processor);
        let outcome = tokio::spawn(async move { processor.attempt(&mut record).await })
            .await
            .map_err(|e| DeliveryError::Task(e.to_string()))??;

        Ok(Retry::Attempted(outcome))
    }

    /// Sweep until shutdown is signalled.
    ///
    /// The first sweep runs straight away, picking up whatever failed while
    /// the service was down.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) {
        internal!(
            "Retry scheduler starting: max_attempts={}, interval={}s",
            self.max_attempts,
            self.interval.as_secs()
        );

        let mut delay = Duration::ZERO;

        loop {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    self.sweep().await;
                    delay = self.interval;
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) => {
                            internal!("Retry scheduler received shutdown signal");
                        }
                        Err(e) => {
                            error!("Retry scheduler shutdown channel error: {e}");
                        }
                    }
                    break;
                }
            }
        }

        internal!("Retry scheduler shutdown complete");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use async_trait::async_trait;
    use missive_common::EmailMessage;
    use missive_store::{RecordStore, TestRecordStore};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        error::TransportError,
        transport::{MailTransport, MockTransport},
    };

    fn transient() -> TransportError {
        TransportError::TemporaryFailure("421 try again later".to_string())
    }

    fn scheduler(
        store: &TestRecordStore,
        transport: Arc<dyn MailTransport>,
        max_attempts: u32,
    ) -> RetryScheduler {
        let processor = Arc::new(DeliveryProcessor::new(Arc::new(store.clone()), transport));
        let config = DeliveryConfig {
            max_attempts,
            retry_interval_secs: 60,
            ..Default::default()
        };
        RetryScheduler::new(processor, &config)
    }

    async fn failed_record(store: &TestRecordStore, recipient: &str) -> DeliveryRecord {
        let mut record = DeliveryRecord::new(EmailMessage::new(recipient, "S", "C"));
        store.save(&mut record).await.unwrap();
        record.record_failure("ConnectionFailed: refused");
        store.save(&mut record).await.unwrap();
        record
    }

    #[test]
    fn settings_come_from_config() {
        let store = TestRecordStore::new();
        let scheduler = scheduler(&store, Arc::new(MockTransport::succeeding()), 5);

        assert_eq!(scheduler.max_attempts(), 5);
        assert_eq!(scheduler.interval(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn empty_sweep_is_a_no_op() {
        let store = TestRecordStore::new();
        let transport = MockTransport::succeeding();
        let scheduler = scheduler(&store, Arc::new(transport.clone()), 3);

        let report = scheduler.sweep().await;

        assert!(report.is_empty());
        assert_eq!(transport.call_count(), 0);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn sweep_retries_failed_records() {
        let store = TestRecordStore::new();
        let transport = MockTransport::succeeding().then_fail(transient());
        let scheduler = scheduler(&store, Arc::new(transport.clone()), 3);

        let first = failed_record(&store, "a@x.com").await;
        let second = failed_record(&store, "b@x.com").await;

        let report = scheduler.sweep().await;

        assert_eq!(
            report,
            SweepReport {
                examined: 2,
                sent: 1,
                failed: 1,
                ..Default::default()
            }
        );

        let first = store.read(&first.id.unwrap()).await.unwrap();
        assert_eq!(first.status(), DeliveryStatus::Failed);
        assert_eq!(first.attempts(), 2);
        assert_eq!(
            first.error_message(),
            Some("TemporaryFailure: 421 try again later")
        );

        let second = store.read(&second.id.unwrap()).await.unwrap();
        assert_eq!(second.status(), DeliveryStatus::Sent);
        assert_eq!(second.attempts(), 2);
        assert_eq!(second.error_message(), None);
    }

    #[tokio::test]
    async fn exhausted_records_are_dead_lettered_without_sending() {
        let store = TestRecordStore::new();
        let transport = MockTransport::succeeding();
        let scheduler = scheduler(&store, Arc::new(transport.clone()), 1);

        let record = failed_record(&store, "a@x.com").await;

        let report = scheduler.sweep().await;

        assert_eq!(report.dead_lettered, 1);
        assert_eq!(transport.call_count(), 0);

        let stored = store.read(&record.id.unwrap()).await.unwrap();
        assert_eq!(stored.status(), DeliveryStatus::Dead);
        assert_eq!(stored.attempts(), 1);
        assert_eq!(stored.error_message(), Some("ConnectionFailed: refused"));

        // Dead records are never looked at again
        assert!(scheduler.sweep().await.is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_isolated_to_one_record() {
        let store = TestRecordStore::new();
        let transport = MockTransport::succeeding();
        let scheduler = scheduler(&store, Arc::new(transport.clone()), 3);

        let first = failed_record(&store, "a@x.com").await;
        let second = failed_record(&store, "b@x.com").await;
        store.fail_next_saves(1);

        let report = scheduler.sweep().await;

        assert_eq!(report.examined, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.sent, 1);

        let first = store.read(&first.id.unwrap()).await.unwrap();
        assert_eq!(first.status(), DeliveryStatus::Failed);
        assert_eq!(first.attempts(), 1);

        let second = store.read(&second.id.unwrap()).await.unwrap();
        assert_eq!(second.status(), DeliveryStatus::Sent);
    }

    #[derive(Debug)]
    struct PanickingTransport;

    #[async_trait]
    impl MailTransport for PanickingTransport {
        async fn send(&self, recipient: &str, _: &str, _: &str) -> Result<(), TransportError> {
            if recipient.starts_with("boom") {
                panic!("transport blew up");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn panicking_attempt_is_isolated() {
        let store = TestRecordStore::new();
        let scheduler = scheduler(&store, Arc::new(PanickingTransport), 3);

        let bad = failed_record(&store, "boom@x.com").await;
        let good = failed_record(&store, "ok@x.com").await;

        let report = scheduler.sweep().await;

        assert_eq!(report.errors, 1);
        assert_eq!(report.sent, 1);

        let bad = store.read(&bad.id.unwrap()).await.unwrap();
        assert_eq!(bad.status(), DeliveryStatus::Failed);
        assert_eq!(bad.attempts(), 1);

        let good = store.read(&good.id.unwrap()).await.unwrap();
        assert_eq!(good.status(), DeliveryStatus::Sent);
    }

    #[tokio::test(start_paused = true)]
    async fn serve_sweeps_until_shutdown() {
        let store = TestRecordStore::new();
        let transport = MockTransport::failing(transient());
        let scheduler = scheduler(&store, Arc::new(transport.clone()), 3);
        failed_record(&store, "a@x.com").await;

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.serve(rx).await }
        });

        let dead = store
            .wait_for_status(DeliveryStatus::Dead, 1, Duration::from_secs(600))
            .await
            .unwrap();

        assert_eq!(dead[0].attempts(), 3);
        assert_eq!(transport.call_count(), 2);

        tx.send(Signal::Shutdown).unwrap();
        handle.await.unwrap();
    }
}

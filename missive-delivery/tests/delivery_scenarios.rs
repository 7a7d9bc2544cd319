//! End-to-end delivery scenarios: ingest, retry sweeps and dead-lettering
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use missive_delivery::{
    DeliveryConfig, DeliveryProcessor, DeliveryStatus, EmailMessage, IngestionAdapter,
    RetryScheduler, SweepReport, TransportError,
    transport::{MailTransport, MockTransport},
};
use missive_store::{FileRecordStore, RecordStore, TestRecordStore};
use pretty_assertions::assert_eq;

fn connection_refused() -> TransportError {
    TransportError::ConnectionFailed("connection refused".to_string())
}

fn message() -> EmailMessage {
    EmailMessage::new("user@example.com", "Welcome", "Hello there")
}

fn build(
    store: Arc<dyn RecordStore>,
    transport: Arc<dyn MailTransport>,
    max_attempts: u32,
) -> (Arc<DeliveryProcessor>, RetryScheduler) {
    let config = DeliveryConfig {
        max_attempts,
        retry_interval_secs: 1,
        ..Default::default()
    };
    let processor = Arc::new(DeliveryProcessor::new(store, transport));
    let scheduler = RetryScheduler::new(Arc::clone(&processor), &config);
    (processor, scheduler)
}

#[tokio::test]
async fn test_successful_first_attempt() {
    let store = TestRecordStore::new();
    let transport = MockTransport::succeeding();
    let (processor, _) = build(Arc::new(store.clone()), Arc::new(transport.clone()), 3);

    let record = processor.ingest(message()).await.unwrap();

    let stored = store.read(&record.id.unwrap()).await.unwrap();
    assert_eq!(stored.status(), DeliveryStatus::Sent);
    assert_eq!(stored.attempts(), 1);
    assert_eq!(stored.error_message(), None);
    assert_eq!(transport.calls()[0].recipient, "user@example.com");
}

#[tokio::test]
async fn test_fails_once_then_succeeds_on_sweep() {
    let store = TestRecordStore::new();
    let transport = MockTransport::succeeding().then_fail(connection_refused());
    let (processor, scheduler) = build(Arc::new(store.clone()), Arc::new(transport.clone()), 3);

    let record = processor.ingest(message()).await.unwrap();
    let id = record.id.unwrap();

    let stored = store.read(&id).await.unwrap();
    assert_eq!(stored.status(), DeliveryStatus::Failed);
    assert_eq!(stored.attempts(), 1);
    assert_eq!(
        stored.error_message(),
        Some("ConnectionFailed: connection refused")
    );

    let report = scheduler.sweep().await;
    assert_eq!(report.sent, 1);

    let stored = store.read(&id).await.unwrap();
    assert_eq!(stored.status(), DeliveryStatus::Sent);
    assert_eq!(stored.attempts(), 2);
    assert_eq!(stored.error_message(), None);
    assert!(stored.last_attempt_time() >= record.last_attempt_time());
}

#[tokio::test]
async fn test_always_failing_is_dead_lettered() {
    let store = TestRecordStore::new();
    let transport = MockTransport::failing(connection_refused());
    let (processor, scheduler) = build(Arc::new(store.clone()), Arc::new(transport.clone()), 3);

    let id = processor.ingest(message()).await.unwrap().id.unwrap();
    assert_eq!(store.read(&id).await.unwrap().attempts(), 1);

    for expected in [2, 3] {
        scheduler.sweep().await;
        let stored = store.read(&id).await.unwrap();
        assert_eq!(stored.status(), DeliveryStatus::Failed);
        assert_eq!(stored.attempts(), expected);
    }
    assert_eq!(transport.call_count(), 3);

    let report = scheduler.sweep().await;
    assert_eq!(
        report,
        SweepReport {
            examined: 1,
            dead_lettered: 1,
            ..Default::default()
        }
    );
    assert_eq!(transport.call_count(), 3);

    let stored = store.read(&id).await.unwrap();
    assert_eq!(stored.status(), DeliveryStatus::Dead);
    assert_eq!(stored.attempts(), 3);
    assert_eq!(
        stored.error_message(),
        Some("ConnectionFailed: connection refused")
    );
}

#[tokio::test]
async fn test_sweep_without_failures_is_a_no_op() {
    let store = TestRecordStore::new();
    let transport = MockTransport::succeeding();
    let (processor, scheduler) = build(Arc::new(store.clone()), Arc::new(transport.clone()), 3);

    processor.ingest(message()).await.unwrap();
    let saves = store.save_count();

    let report = scheduler.sweep().await;

    assert!(report.is_empty());
    assert_eq!(store.save_count(), saves);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_terminal_records_are_never_touched_again() {
    let store = TestRecordStore::new();
    let transport = MockTransport::failing(connection_refused());
    let (processor, scheduler) = build(Arc::new(store.clone()), Arc::new(transport.clone()), 1);

    let id = processor.ingest(message()).await.unwrap().id.unwrap();
    scheduler.sweep().await;

    let mut dead = store.read(&id).await.unwrap();
    assert_eq!(dead.status(), DeliveryStatus::Dead);
    let calls = transport.call_count();

    for _ in 0..3 {
        scheduler.sweep().await;
        processor.attempt(&mut dead).await.unwrap();
    }

    assert_eq!(store.read(&id).await.unwrap(), dead);
    assert_eq!(dead.attempts(), 1);
    assert_eq!(transport.call_count(), calls);
}

#[tokio::test]
async fn test_stale_copy_cannot_overwrite_newer_record() {
    let store = TestRecordStore::new();
    let transport = MockTransport::failing(connection_refused());
    let (processor, scheduler) = build(Arc::new(store.clone()), Arc::new(transport), 3);

    let mut stale = processor.ingest(message()).await.unwrap();
    scheduler.sweep().await;

    let err = processor.attempt(&mut stale).await.unwrap_err();
    assert!(err.is_conflict());

    let stored = store.read(&stale.id.unwrap()).await.unwrap();
    assert_eq!(stored.attempts(), 2);
}

#[tokio::test]
async fn test_sweep_continues_past_store_failure() {
    let store = TestRecordStore::new();
    let transport = MockTransport::succeeding()
        .then_fail(connection_refused())
        .then_fail(connection_refused());
    let (processor, scheduler) = build(Arc::new(store.clone()), Arc::new(transport), 3);

    let first = processor.ingest(message()).await.unwrap().id.unwrap();
    let second = processor.ingest(message()).await.unwrap().id.unwrap();

    store.fail_next_saves(1);
    let report = scheduler.sweep().await;

    assert_eq!(report.examined, 2);
    assert_eq!(report.errors, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(
        store.read(&first).await.unwrap().status(),
        DeliveryStatus::Failed
    );
    assert_eq!(
        store.read(&second).await.unwrap().status(),
        DeliveryStatus::Sent
    );

    // The record that could not be saved is picked up again
    let report = scheduler.sweep().await;
    assert_eq!(report.sent, 1);
    assert_eq!(
        store.read(&first).await.unwrap().status(),
        DeliveryStatus::Sent
    );
}

#[tokio::test]
async fn test_malformed_payloads_never_create_records() {
    let store = TestRecordStore::new();
    let transport = MockTransport::succeeding();
    let (processor, _) = build(Arc::new(store.clone()), Arc::new(transport.clone()), 3);
    let adapter = IngestionAdapter::new(processor, &DeliveryConfig::default());

    let payloads: [&[u8]; 4] = [
        b"",
        b"[]",
        br#"{"recipient": "a@x.com"}"#,
        br#"{"recipient": "", "subject": "S", "content": "C"}"#,
    ];
    for payload in payloads {
        assert!(adapter.handle(payload).await.unwrap_err().is_rejection());
    }
    assert_eq!(store.record_count(), 0);

    let record = adapter
        .handle(br#"{"to": "a@x.com", "subject": "S", "content": "C", "extra": true}"#)
        .await
        .unwrap();
    assert_eq!(record.recipient(), "a@x.com");
    assert_eq!(store.record_count(), 1);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_dead_lettering_on_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::failing(connection_refused());

    let store = Arc::new(FileRecordStore::builder().path(dir.path()).build().unwrap());
    let (processor, scheduler) = build(store, Arc::new(transport.clone()), 3);

    let id = processor.ingest(message()).await.unwrap().id.unwrap();
    scheduler.sweep().await;
    scheduler.sweep().await;
    scheduler.sweep().await;

    // A fresh handle sees what the previous one wrote
    let reopened = FileRecordStore::builder().path(dir.path()).build().unwrap();
    let stored = reopened.read(&id).await.unwrap();

    assert_eq!(stored.status(), DeliveryStatus::Dead);
    assert_eq!(stored.attempts(), 3);
    assert_eq!(transport.call_count(), 3);
    assert!(
        reopened
            .find_by_status(DeliveryStatus::Failed)
            .await
            .unwrap()
            .is_empty()
    );
}

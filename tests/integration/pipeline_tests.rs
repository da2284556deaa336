use super::*;
use chrono::Duration;
use shipwatch::formatter::{parse_map_link, FIELD_STALE};
use shipwatch::storage::{JsonFileStore, RecordStore};
use shipwatch::{MessageKind, Trigger, UpdateResponse};
use tempfile::TempDir;

fn completed(response: UpdateResponse) -> shipwatch::CycleOutcome {
    match response {
        UpdateResponse::Completed(outcome) => *outcome,
        UpdateResponse::AlreadyUpdating => panic!("cycle was rejected"),
    }
}

#[tokio::test]
async fn test_live_cycle_persists_and_publishes() {
    let dir = TempDir::new().unwrap();
    let config = get_test_config(dir.path());
    let record = record_at(Utc::now());
    let extractor = Arc::new(StubExtractor::new(vec![Ok(record.clone())]));
    let publisher = Arc::new(RecordingPublisher::default());
    let orchestrator = create_test_orchestrator(&config, extractor.clone(), publisher.clone());

    let outcome = completed(orchestrator.trigger(Trigger::OnDemand).await);
    assert_eq!(outcome.kind, MessageKind::Live);
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.persisted);
    assert!(outcome.published);

    let history_file = config.history_dir().join(format!("{}.json", MMSI));
    assert!(history_file.exists());
    let stored = JsonFileStore::new(config.history_dir(), MMSI).all().await.unwrap();
    assert_eq!(stored, vec![record]);

    let sent = publisher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, MessageKind::Live);
    assert!(sent[0].description.contains("Big Blue"));
    assert_eq!(sent[0].closing.as_deref(), Some("Fair winds!"));
    let (lat, lon) = parse_map_link(sent[0].map_link_url.as_deref().unwrap()).unwrap();
    assert!((lat - 30.0123).abs() < 1e-6);
    assert!((lon - 32.5512).abs() < 1e-6);
}

#[tokio::test]
async fn test_retries_until_success() {
    let dir = TempDir::new().unwrap();
    let config = get_test_config(dir.path());
    let extractor = Arc::new(StubExtractor::new(vec![
        Err(ExtractionError::Timeout("panel".to_string())),
        Err(ExtractionError::ConsentBlocked("fc-dialog".to_string())),
        Ok(record_at(Utc::now())),
    ]));
    let publisher = Arc::new(RecordingPublisher::default());
    let orchestrator = create_test_orchestrator(&config, extractor.clone(), publisher.clone());

    let outcome = completed(orchestrator.trigger(Trigger::Scheduled).await);
    assert_eq!(outcome.kind, MessageKind::Live);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(extractor.calls(), 3);
    assert_eq!(publisher.sent().len(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_fall_back_to_stored_record() {
    let dir = TempDir::new().unwrap();
    let config = get_test_config(dir.path());
    let previous = record_at(Utc::now() - Duration::hours(3));
    JsonFileStore::new(config.history_dir(), MMSI).append(&previous).await.unwrap();

    let extractor = Arc::new(StubExtractor::new(vec![]));
    let publisher = Arc::new(RecordingPublisher::default());
    let orchestrator = create_test_orchestrator(&config, extractor.clone(), publisher.clone());

    let outcome = completed(orchestrator.trigger(Trigger::OnDemand).await);
    assert_eq!(outcome.kind, MessageKind::Stale);
    assert_eq!(outcome.attempts, config.retry.max_attempts);
    assert!(outcome.last_error.is_some());
    assert!(!outcome.persisted);
    assert_eq!(outcome.record, Some(previous));

    let sent = publisher.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].field(FIELD_STALE).is_some());
}

#[tokio::test]
async fn test_no_history_sends_no_data_notice() {
    let dir = TempDir::new().unwrap();
    let config = get_test_config(dir.path());
    let extractor = Arc::new(StubExtractor::new(vec![]));
    let publisher = Arc::new(RecordingPublisher::default());
    let orchestrator = create_test_orchestrator(&config, extractor, publisher.clone());

    let outcome = completed(orchestrator.trigger(Trigger::OnDemand).await);
    assert_eq!(outcome.kind, MessageKind::NoData);
    assert!(outcome.record.is_none());

    let sent = publisher.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].description.contains(&MMSI.to_string()));
    assert!(sent[0].map_link_url.is_none());
}

#[tokio::test]
async fn test_publish_failure_still_persists() {
    let dir = TempDir::new().unwrap();
    let config = get_test_config(dir.path());
    let extractor = Arc::new(StubExtractor::new(vec![Ok(record_at(Utc::now()))]));
    let publisher = Arc::new(RecordingPublisher::rejecting());
    let orchestrator = create_test_orchestrator(&config, extractor, publisher);

    let outcome = completed(orchestrator.trigger(Trigger::OnDemand).await);
    assert!(outcome.persisted);
    assert!(!outcome.published);
    assert!(outcome.publish_error.unwrap().contains("401"));
    assert_eq!(orchestrator.history().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_successful_cycle_prunes_expired_history() {
    let dir = TempDir::new().unwrap();
    let config = get_test_config(dir.path());
    let store = JsonFileStore::new(config.history_dir(), MMSI);
    store.append(&record_at(Utc::now() - Duration::days(45))).await.unwrap();
    store.append(&record_at(Utc::now() - Duration::days(2))).await.unwrap();

    let fresh = record_at(Utc::now());
    let extractor = Arc::new(StubExtractor::new(vec![Ok(fresh.clone())]));
    let publisher = Arc::new(RecordingPublisher::default());
    let orchestrator = create_test_orchestrator(&config, extractor, publisher);

    let outcome = completed(orchestrator.trigger(Trigger::Scheduled).await);
    let cleanup = outcome.cleanup.unwrap();
    assert_eq!(cleanup.records_removed, 1);
    assert!(cleanup.errors.is_empty());

    let history = orchestrator.history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(orchestrator.latest_record().await.unwrap(), Some(fresh));
}

#[tokio::test]
async fn test_history_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = get_test_config(dir.path());
    let record = record_at(Utc::now() - Duration::minutes(10));

    let first = create_test_orchestrator(
        &config,
        Arc::new(StubExtractor::new(vec![Ok(record.clone())])),
        Arc::new(RecordingPublisher::default()),
    );
    completed(first.trigger(Trigger::OnDemand).await);
    drop(first);

    let publisher = Arc::new(RecordingPublisher::default());
    let second = create_test_orchestrator(&config, Arc::new(StubExtractor::new(vec![])), publisher.clone());
    let outcome = completed(second.trigger(Trigger::OnDemand).await);

    assert_eq!(outcome.kind, MessageKind::Stale);
    assert_eq!(outcome.record, Some(record));
    assert_eq!(publisher.sent()[0].kind, MessageKind::Stale);
}

use super::*;
use shipwatch::web::{create_router, AppState};
use shipwatch::{MessageKind, UpdateScheduler};
use tempfile::TempDir;
use tokio::sync::Mutex as AsyncMutex;

#[tokio::test]
async fn test_scheduled_tick_runs_full_cycle() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let config = get_test_config(dir.path());
    let publisher = Arc::new(RecordingPublisher::default());
    let orchestrator = create_test_orchestrator(
        &config,
        Arc::new(StubExtractor::new(vec![Ok(record_at(Utc::now()))])),
        publisher.clone(),
    );

    // JobScheduler creation can fail in restricted environments
    let Ok(scheduler) = UpdateScheduler::new(orchestrator, config.scheduler.clone()).await else {
        return Ok(());
    };

    let response = scheduler.tick().await;
    assert_eq!(response.outcome().map(|o| o.kind), Some(MessageKind::Live));
    assert_eq!(publisher.sent().len(), 1);

    let info = scheduler.info().await;
    assert_eq!(info.run_count, 1);
    assert_eq!(info.last_kind, Some(MessageKind::Live));
    Ok(())
}

#[tokio::test]
async fn test_status_includes_scheduler_info() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let config = get_test_config(dir.path());
    let orchestrator = create_test_orchestrator(
        &config,
        Arc::new(StubExtractor::default()),
        Arc::new(RecordingPublisher::default()),
    );

    let Ok(mut scheduler) = UpdateScheduler::new(orchestrator.clone(), config.scheduler.clone()).await else {
        return Ok(());
    };
    scheduler.start().await?;
    let scheduler = Arc::new(AsyncMutex::new(scheduler));

    let app = create_router(AppState::new(orchestrator).with_scheduler(scheduler.clone()));
    let (status, body) = make_request(app, Method::GET, "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["scheduler"]["interval_secs"], config.scheduler.interval_secs);
    assert_eq!(body["data"]["scheduler"]["run_count"], 0);
    assert!(body["data"]["scheduler"]["next_run"].is_string());

    scheduler.lock().await.shutdown().await?;
    Ok(())
}

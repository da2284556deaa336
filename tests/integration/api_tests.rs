use super::*;
use shipwatch::web::{create_router, AppState};
use tempfile::TempDir;

fn create_test_app(
    dir: &TempDir,
    extractor: StubExtractor,
    publisher: RecordingPublisher,
) -> (Router, Arc<RecordingPublisher>) {
    let config = get_test_config(dir.path());
    let publisher = Arc::new(publisher);
    let orchestrator = create_test_orchestrator(&config, Arc::new(extractor), publisher.clone());
    (create_router(AppState::new(orchestrator)), publisher)
}

#[tokio::test]
async fn test_health_check() {
    let dir = TempDir::new().unwrap();
    let (app, _) = create_test_app(&dir, StubExtractor::default(), RecordingPublisher::default());

    let (status, body) = make_request(app, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_update_then_status_and_history() {
    let dir = TempDir::new().unwrap();
    let record = record_at(Utc::now());
    let (app, publisher) = create_test_app(
        &dir,
        StubExtractor::new(vec![Ok(record)]),
        RecordingPublisher::default(),
    );

    let (status, body) = make_request(app.clone(), Method::POST, "/api/v1/update").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["kind"], "live");
    assert_eq!(body["data"]["record"]["name"], "EVER GIVEN");
    assert_eq!(body["data"]["record"]["course"], 187.0);
    assert_eq!(publisher.sent().len(), 1);

    let (status, body) = make_request(app.clone(), Method::GET, "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["publisher"], "recording");
    assert_eq!(body["data"]["last_outcome"]["kind"], "live");
    assert_eq!(body["data"]["latest_record"]["mmsi"], MMSI);
    assert_eq!(body["data"]["update_interval_secs"], 172800);

    let (status, body) = make_request(app, Method::GET, "/api/v1/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_connection_reports_reachability() {
    let dir = TempDir::new().unwrap();
    let (app, _) = create_test_app(&dir, StubExtractor::default(), RecordingPublisher::default());
    let (status, body) = make_request(app, Method::POST, "/api/v1/test").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reachable"], true);

    let (app, _) = create_test_app(&dir, StubExtractor::default(), RecordingPublisher::rejecting());
    let (status, body) = make_request(app, Method::POST, "/api/v1/test").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reachable"], false);
}

#[tokio::test]
async fn test_update_while_busy_returns_conflict() {
    let dir = TempDir::new().unwrap();
    let config = get_test_config(dir.path());
    let extractor = Arc::new(SlowExtractor);
    let publisher = Arc::new(RecordingPublisher::default());
    let orchestrator = build_orchestrator_with(&config, extractor, publisher).unwrap();
    let app = create_router(AppState::new(orchestrator.clone()));

    let running = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.trigger(shipwatch::Trigger::Scheduled).await }
    });

    let busy = async {
        for _ in 0..200 {
            if orchestrator.is_updating() {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        false
    };
    assert!(busy.await);

    let (status, body) = make_request(app, Method::POST, "/api/v1/update").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_UPDATING");

    assert!(running.await.unwrap().outcome().is_some());
}

/// Holds the cycle open long enough for a second trigger to collide with it.
struct SlowExtractor;

impl PageExtractor for SlowExtractor {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn fetch(&self, _mmsi: u64) -> Result<VesselRecord, ExtractionError> {
        std::thread::sleep(std::time::Duration::from_millis(300));
        Ok(record_at(Utc::now()))
    }

    fn abort(&self) {}
}

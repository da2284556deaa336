pub mod api_tests;
pub mod pipeline_tests;
pub mod scheduler_tests;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use shipwatch::models::Message;
use shipwatch::plugins::{PageExtractor, PublishReceipt, Publisher};
use shipwatch::utils::error::{ExtractionError, PublishError};
use shipwatch::{build_orchestrator_with, AppConfig, Course, NewVesselRecord, UpdateOrchestrator, VesselRecord};

pub const MMSI: u64 = 353136000;

/// Test configuration rooted in a temp dir, with millisecond retry delays.
pub fn get_test_config(data_dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.vessel.mmsi = MMSI;
    config.vessel.nickname = Some("Big Blue".to_string());
    config.discord.webhook_url = Some("https://discord.com/api/webhooks/1/test".to_string());
    config.storage.data_dir = data_dir.to_path_buf();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.scheduler.run_on_start = false;
    config.notifications.closing_messages = vec!["Fair winds!".to_string()];
    config
}

pub fn record_at(captured_at: DateTime<Utc>) -> VesselRecord {
    VesselRecord::new(NewVesselRecord {
        name: "EVER GIVEN".to_string(),
        mmsi: MMSI,
        latitude: 30.0123,
        longitude: 32.5512,
        speed_knots: 12.4,
        course: Course::Degrees(187.0),
        vessel_type: "Container Ship".to_string(),
        captured_at,
    })
    .unwrap()
}

/// Plays back queued fetch results; fails with a network error once the
/// script runs out.
#[derive(Default)]
pub struct StubExtractor {
    script: Mutex<VecDeque<Result<VesselRecord, ExtractionError>>>,
    calls: AtomicU32,
}

impl StubExtractor {
    pub fn new(script: Vec<Result<VesselRecord, ExtractionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PageExtractor for StubExtractor {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn fetch(&self, _mmsi: u64) -> Result<VesselRecord, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ExtractionError::Network("script exhausted".to_string())))
    }

    fn abort(&self) {}
}

/// Keeps every published message; optionally rejects them all.
#[derive(Default)]
pub struct RecordingPublisher {
    pub sent: Mutex<Vec<Message>>,
    pub reject: bool,
}

impl RecordingPublisher {
    pub fn rejecting() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn publish(&self, message: &Message) -> Result<PublishReceipt, PublishError> {
        if self.reject {
            return Err(PublishError::Rejected {
                status: 401,
                body: "401: Unauthorized".to_string(),
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(PublishReceipt {
            message_id: Some(self.sent.lock().unwrap().len().to_string()),
            published_at: Utc::now(),
        })
    }

    async fn test_connection(&self) -> Result<bool, PublishError> {
        Ok(!self.reject)
    }
}

pub fn create_test_orchestrator(
    config: &AppConfig,
    extractor: Arc<StubExtractor>,
    publisher: Arc<RecordingPublisher>,
) -> Arc<UpdateOrchestrator> {
    build_orchestrator_with(config, extractor, publisher).unwrap()
}

/// Send one request through the router and decode the JSON body.
pub async fn make_request(app: Router, method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

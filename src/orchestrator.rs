use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{error, info, warn};

use crate::cleaner::{Cleaner, CleanupReport};
use crate::formatter::{FormatContext, NotificationFormatter};
use crate::models::{Message, MessageKind, VesselRecord};
use crate::plugins::traits::{PageExtractor, Publisher};
use crate::storage::RecordStore;
use crate::utils::error::{ExtractionError, PublishError, StoreError};

/// How long to wait for an aborted fetch to unwind before logging about it.
const ABORT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    OnDemand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UpdateState {
    Idle,
    Fetching { attempt: u32 },
    Retrying { attempt: u32 },
    Success,
    Failed,
    Publishing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total fetch attempts per cycle, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Hard limit on a single fetch.
    pub fetch_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(90),
        }
    }
}

impl RetryPolicy {
    /// Delays between attempts: base, 2×base, 4×base… capped at `max_delay`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        // The strategy starts at 2 × factor, so run it at double scale and halve.
        let base_ms = self.base_delay.as_millis() as u64;
        ExponentialBackoff::from_millis(2)
            .factor(base_ms.max(1))
            .max_delay(self.max_delay.saturating_mul(2))
            .map(|delay| delay / 2)
            .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub trigger: Trigger,
    pub kind: MessageKind,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub persisted: bool,
    pub published: bool,
    pub publish_error: Option<String>,
    pub record: Option<VesselRecord>,
    pub message: Message,
    pub cleanup: Option<CleanupReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum UpdateResponse {
    Completed(Box<CycleOutcome>),
    /// Another cycle held the guard; nothing was done.
    AlreadyUpdating,
}

impl UpdateResponse {
    pub fn outcome(&self) -> Option<&CycleOutcome> {
        match self {
            UpdateResponse::Completed(outcome) => Some(outcome),
            UpdateResponse::AlreadyUpdating => None,
        }
    }
}

/// Runs fetch → persist → clean → format → publish, one cycle at a time.
pub struct UpdateOrchestrator {
    mmsi: u64,
    extractor: Arc<dyn PageExtractor>,
    store: Arc<dyn RecordStore>,
    formatter: Arc<NotificationFormatter>,
    publisher: Arc<dyn Publisher>,
    cleaner: Option<Arc<Cleaner>>,
    policy: RetryPolicy,
    update_interval: chrono::Duration,
    cycle_lock: Mutex<()>,
    in_flight: AtomicBool,
    state: RwLock<UpdateState>,
    last_outcome: RwLock<Option<CycleOutcome>>,
}

impl UpdateOrchestrator {
    pub fn new(
        mmsi: u64,
        extractor: Arc<dyn PageExtractor>,
        store: Arc<dyn RecordStore>,
        formatter: Arc<NotificationFormatter>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            mmsi,
            extractor,
            store,
            formatter,
            publisher,
            cleaner: None,
            policy: RetryPolicy::default(),
            update_interval: chrono::Duration::hours(48),
            cycle_lock: Mutex::new(()),
            in_flight: AtomicBool::new(false),
            state: RwLock::new(UpdateState::Idle),
            last_outcome: RwLock::new(None),
        }
    }

    pub fn with_cleaner(mut self, cleaner: Arc<Cleaner>) -> Self {
        self.cleaner = Some(cleaner);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_update_interval(mut self, interval: chrono::Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn mmsi(&self) -> u64 {
        self.mmsi
    }

    pub fn update_interval(&self) -> chrono::Duration {
        self.update_interval
    }

    pub async fn state(&self) -> UpdateState {
        *self.state.read().await
    }

    pub async fn last_outcome(&self) -> Option<CycleOutcome> {
        self.last_outcome.read().await.clone()
    }

    pub fn is_updating(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn latest_record(&self) -> Result<Option<VesselRecord>, StoreError> {
        self.store.latest().await
    }

    pub async fn history(&self) -> Result<Vec<VesselRecord>, StoreError> {
        self.store.all().await
    }

    pub async fn test_publisher(&self) -> Result<bool, PublishError> {
        self.publisher.test_connection().await
    }

    pub fn publisher_name(&self) -> &'static str {
        self.publisher.name()
    }

    /// Run one cycle unless one is already in flight.
    pub async fn trigger(&self, trigger: Trigger) -> UpdateResponse {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("Update already in progress, rejecting {:?} trigger", trigger);
            metrics::counter!("shipwatch_cycles_rejected_total").increment(1);
            return UpdateResponse::AlreadyUpdating;
        };
        self.in_flight.store(true, Ordering::SeqCst);

        let outcome = self.run_cycle(trigger).await;
        *self.last_outcome.write().await = Some(outcome.clone());
        self.set_state(UpdateState::Idle).await;
        self.in_flight.store(false, Ordering::SeqCst);

        UpdateResponse::Completed(Box::new(outcome))
    }

    async fn set_state(&self, state: UpdateState) {
        *self.state.write().await = state;
    }

    async fn run_cycle(&self, trigger: Trigger) -> CycleOutcome {
        let started_at = Utc::now();
        let timer = Instant::now();
        info!("Starting {:?} update cycle for MMSI {}", trigger, self.mmsi);

        let (result, attempts) = self.fetch_with_retry().await;

        let mut persisted = false;
        let mut cleanup = None;
        let mut last_error = None;

        let (record, message) = match result {
            Ok(record) => {
                self.set_state(UpdateState::Success).await;

                match self.store.append(&record).await {
                    Ok(()) => persisted = true,
                    Err(e) => error!("Failed to persist record: {}", e),
                }

                if let Some(cleaner) = &self.cleaner {
                    cleanup = Some(cleaner.prune(Utc::now()).await);
                }

                let ctx = FormatContext::live(Utc::now(), self.update_interval);
                let message = self.formatter.format(&record, &ctx);
                (Some(record), message)
            }
            Err(e) => {
                self.set_state(UpdateState::Failed).await;
                error!("Giving up after {} attempts: {}", attempts, e);
                last_error = Some(e.to_string());

                let latest = match self.store.latest().await {
                    Ok(latest) => latest,
                    Err(err) => {
                        warn!("Could not read stored history, treating as empty: {}", err);
                        None
                    }
                };

                let ctx = FormatContext::fallback(Utc::now(), self.update_interval);
                match latest {
                    Some(record) => {
                        info!("Falling back to record captured at {}", record.captured_at());
                        let message = self.formatter.format(&record, &ctx);
                        (Some(record), message)
                    }
                    None => {
                        warn!("No stored record to fall back on");
                        (None, self.formatter.format_no_data(self.mmsi, &ctx))
                    }
                }
            }
        };

        self.set_state(UpdateState::Publishing).await;
        let (published, publish_error) = match self.publisher.publish(&message).await {
            Ok(receipt) => {
                info!(
                    "Published {} message via {} ({:?})",
                    message.kind.as_str(),
                    self.publisher.name(),
                    receipt.message_id
                );
                (true, None)
            }
            Err(e) => {
                error!("Failed to publish {} message: {}", message.kind.as_str(), e);
                (false, Some(e.to_string()))
            }
        };

        metrics::counter!("shipwatch_cycles_total", "kind" => message.kind.as_str()).increment(1);
        metrics::histogram!("shipwatch_cycle_duration_seconds").record(timer.elapsed().as_secs_f64());
        if !published {
            metrics::counter!("shipwatch_publish_failures_total").increment(1);
        }

        let finished_at = Utc::now();
        info!(
            "Cycle finished: kind={} attempts={} persisted={} published={} in {:?}",
            message.kind.as_str(),
            attempts,
            persisted,
            published,
            timer.elapsed()
        );

        CycleOutcome {
            trigger,
            kind: message.kind,
            attempts,
            last_error,
            persisted,
            published,
            publish_error,
            record,
            message,
            cleanup,
            started_at,
            finished_at,
        }
    }

    async fn fetch_with_retry(&self) -> (Result<VesselRecord, ExtractionError>, u32) {
        let mut delays = self.policy.delays();
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.set_state(UpdateState::Fetching { attempt }).await;

            let error = match self.fetch_once().await {
                Ok(record) => {
                    metrics::counter!("shipwatch_fetch_success_total").increment(1);
                    return (Ok(record), attempt);
                }
                Err(e) => e,
            };

            metrics::counter!("shipwatch_fetch_failures_total", "reason" => error.reason()).increment(1);

            match delays.next() {
                Some(delay) if attempt < self.policy.max_attempts => {
                    warn!(
                        "Fetch attempt {}/{} failed ({}), retrying in {:?}",
                        attempt, self.policy.max_attempts, error, delay
                    );
                    self.set_state(UpdateState::Retrying { attempt }).await;
                    tokio::time::sleep(delay).await;
                }
                _ => return (Err(error), attempt),
            }
        }
    }

    /// One fetch on the blocking pool, bounded by the hard timeout.
    ///
    /// A timed-out fetch is aborted and then awaited, so no two fetches ever
    /// overlap and the cycle guard is held until the worker has returned.
    async fn fetch_once(&self) -> Result<VesselRecord, ExtractionError> {
        let extractor = self.extractor.clone();
        let mmsi = self.mmsi;
        let mut handle = tokio::task::spawn_blocking(move || extractor.fetch(mmsi));

        match tokio::time::timeout(self.policy.fetch_timeout, &mut handle).await {
            Ok(joined) => joined.unwrap_or_else(|join_error| Err(worker_failed(join_error))),
            Err(_) => {
                warn!("Fetch exceeded {:?}, aborting browser session", self.policy.fetch_timeout);
                self.extractor.abort();

                if tokio::time::timeout(ABORT_GRACE, &mut handle).await.is_err() {
                    warn!("Aborted fetch still running after {:?}, waiting for it to exit", ABORT_GRACE);
                    if let Err(join_error) = handle.await {
                        warn!("{}", worker_failed(join_error));
                    }
                }

                Err(ExtractionError::Timeout(format!(
                    "fetch exceeded {:?}",
                    self.policy.fetch_timeout
                )))
            }
        }
    }
}

fn worker_failed(join_error: tokio::task::JoinError) -> ExtractionError {
    ExtractionError::Network(format!("extraction worker failed: {}", join_error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::ClosingSelector;
    use crate::models::{Course, NewVesselRecord};
    use crate::plugins::traits::{MockPageExtractor, MockPublisher, PublishReceipt};
    use crate::storage::JsonFileStore;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tempfile::TempDir;

    const MMSI: u64 = 353136000;

    fn record_at(captured_at: DateTime<Utc>) -> VesselRecord {
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

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            fetch_timeout: Duration::from_secs(5),
        }
    }

    fn formatter() -> Arc<NotificationFormatter> {
        let selector = ClosingSelector::seeded(vec!["Fair winds!".to_string()], 1).unwrap();
        Arc::new(NotificationFormatter::new(selector))
    }

    fn receipt() -> PublishReceipt {
        PublishReceipt {
            message_id: Some("1".to_string()),
            published_at: Utc::now(),
        }
    }

    fn orchestrator(
        extractor: impl PageExtractor + 'static,
        publisher: impl Publisher + 'static,
        store: Arc<JsonFileStore>,
        max_attempts: u32,
    ) -> UpdateOrchestrator {
        UpdateOrchestrator::new(MMSI, Arc::new(extractor), store, formatter(), Arc::new(publisher))
            .with_retry_policy(fast_policy(max_attempts))
    }

    #[test]
    fn test_retry_delays_are_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            fetch_timeout: Duration::from_secs(1),
        };
        let delays: Vec<u64> = policy.delays().map(|d| d.as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);

        let single = RetryPolicy {
            max_attempts: 1,
            ..policy
        };
        assert_eq!(single.delays().count(), 0);
    }

    #[rstest::rstest]
    #[case(5, vec![5, 10, 20])]
    #[case(1, vec![1, 2, 4])]
    #[case(3, vec![3, 6, 12])]
    fn test_retry_delays_keep_odd_base(#[case] base_ms: u64, #[case] expected: Vec<u64>) {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(1),
        };
        let delays: Vec<u64> = policy.delays().map(|d| d.as_millis() as u64).collect();
        assert_eq!(delays, expected);
    }

    #[tokio::test]
    async fn test_failures_then_success_publishes_live() {
        const FAILURES: u32 = 2;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path(), MMSI));

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut extractor = MockPageExtractor::new();
        extractor.expect_fetch().times((FAILURES + 1) as usize).returning(move |mmsi| {
            assert_eq!(mmsi, MMSI);
            if counter.fetch_add(1, Ordering::SeqCst) < FAILURES {
                Err(ExtractionError::Network("connection reset".to_string()))
            } else {
                Ok(record_at(Utc::now()))
            }
        });

        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|m| m.kind == MessageKind::Live)
            .times(1)
            .returning(|_| Ok(receipt()));
        publisher.expect_name().return_const("mock");

        let orchestrator = orchestrator(extractor, publisher, store.clone(), 3);
        let response = orchestrator.trigger(Trigger::OnDemand).await;
        let outcome = response.outcome().unwrap();

        assert_eq!(outcome.kind, MessageKind::Live);
        assert_eq!(outcome.attempts, FAILURES + 1);
        assert!(outcome.persisted);
        assert!(outcome.published);
        assert!(outcome.last_error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), FAILURES + 1);
        assert_eq!(store.all().await.unwrap().len(), 1);
        assert_eq!(orchestrator.state().await, UpdateState::Idle);
        assert!(orchestrator.last_outcome().await.is_some());
    }

    #[tokio::test]
    async fn test_always_fail_with_empty_store_publishes_no_data() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path(), MMSI));

        let mut extractor = MockPageExtractor::new();
        extractor
            .expect_fetch()
            .times(3)
            .returning(|_| Err(ExtractionError::LayoutMismatch("speed marker not found".to_string())));

        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|m| m.kind == MessageKind::NoData)
            .times(1)
            .returning(|_| Ok(receipt()));
        publisher.expect_name().return_const("mock");

        let orchestrator = orchestrator(extractor, publisher, store.clone(), 3);
        let response = orchestrator.trigger(Trigger::Scheduled).await;
        let outcome = response.outcome().unwrap();

        assert_eq!(outcome.kind, MessageKind::NoData);
        assert_eq!(outcome.attempts, 3);
        assert!(!outcome.persisted);
        assert!(outcome.record.is_none());
        assert!(outcome.last_error.as_deref().unwrap().contains("speed marker"));
        assert!(store.all().await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_always_fail_with_old_record_publishes_stale() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path(), MMSI));
        let old = record_at(Utc::now() - chrono::Duration::days(3));
        store.append(&old).await.unwrap();

        let mut extractor = MockPageExtractor::new();
        extractor
            .expect_fetch()
            .times(2)
            .returning(|_| Err(ExtractionError::ConsentBlocked("overlay".to_string())));

        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|m| m.kind == MessageKind::Stale && m.title.contains("Last known position"))
            .times(1)
            .returning(|_| Ok(receipt()));
        publisher.expect_name().return_const("mock");

        let orchestrator = orchestrator(extractor, publisher, store.clone(), 2);
        let outcome = orchestrator.trigger(Trigger::Scheduled).await.outcome().cloned().unwrap();

        assert_eq!(outcome.kind, MessageKind::Stale);
        assert_eq!(outcome.record.as_ref(), Some(&old));
        assert!(!outcome.persisted);
        assert_eq!(store.all().await.unwrap(), vec![old]);
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_roll_back_persistence() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path(), MMSI));

        let mut extractor = MockPageExtractor::new();
        extractor.expect_fetch().times(1).returning(|_| Ok(record_at(Utc::now())));

        let mut publisher = MockPublisher::new();
        publisher.expect_publish().times(1).returning(|_| {
            Err(PublishError::Rejected {
                status: 500,
                body: "oops".to_string(),
            })
        });

        let orchestrator = orchestrator(extractor, publisher, store.clone(), 3);
        let outcome = orchestrator.trigger(Trigger::OnDemand).await.outcome().cloned().unwrap();

        assert!(outcome.persisted);
        assert!(!outcome.published);
        assert!(outcome.publish_error.unwrap().contains("500"));
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cleaner_runs_after_success() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("history"), MMSI));
        store.append(&record_at(Utc::now() - chrono::Duration::days(60))).await.unwrap();

        let cleaner = Arc::new(Cleaner::new(
            store.clone(),
            crate::storage::ScreenshotArchive::new(dir.path().join("screenshots")),
            crate::cleaner::RetentionPolicy::default(),
        ));

        let mut extractor = MockPageExtractor::new();
        extractor.expect_fetch().times(1).returning(|_| Ok(record_at(Utc::now())));
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().times(1).returning(|_| Ok(receipt()));
        publisher.expect_name().return_const("mock");

        let orchestrator = orchestrator(extractor, publisher, store.clone(), 1).with_cleaner(cleaner);
        let outcome = orchestrator.trigger(Trigger::Scheduled).await.outcome().cloned().unwrap();

        assert_eq!(outcome.cleanup.unwrap().records_removed, 1);
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    struct SlowExtractor {
        delay: Duration,
        calls: AtomicU32,
        aborted: AtomicBool,
    }

    impl SlowExtractor {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicU32::new(0),
                aborted: AtomicBool::new(false),
            }
        }
    }

    impl PageExtractor for SlowExtractor {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn fetch(&self, _mmsi: u64) -> Result<VesselRecord, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(record_at(Utc::now()))
        }

        fn abort(&self) {
            self.aborted.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_timeout_aborts_extractor() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path(), MMSI));
        let extractor = Arc::new(SlowExtractor::new(Duration::from_millis(500)));

        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|m| m.kind == MessageKind::NoData)
            .times(1)
            .returning(|_| Ok(receipt()));
        publisher.expect_name().return_const("mock");

        let orchestrator = UpdateOrchestrator::new(MMSI, extractor.clone(), store, formatter(), Arc::new(publisher))
            .with_retry_policy(RetryPolicy {
                fetch_timeout: Duration::from_millis(50),
                ..fast_policy(1)
            });

        let outcome = orchestrator.trigger(Trigger::OnDemand).await.outcome().cloned().unwrap();

        assert!(extractor.aborted.load(Ordering::SeqCst));
        assert_eq!(outcome.kind, MessageKind::NoData);
        assert!(outcome.last_error.unwrap().starts_with("Timed out"));
    }

    #[tokio::test]
    async fn test_concurrent_trigger_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path(), MMSI));
        let extractor = Arc::new(SlowExtractor::new(Duration::from_millis(200)));

        let mut publisher = MockPublisher::new();
        publisher.expect_publish().times(1).returning(|_| Ok(receipt()));
        publisher.expect_name().return_const("mock");

        let orchestrator = UpdateOrchestrator::new(MMSI, extractor.clone(), store.clone(), formatter(), Arc::new(publisher))
            .with_retry_policy(fast_policy(1));

        let (first, second) = tokio::join!(
            orchestrator.trigger(Trigger::Scheduled),
            orchestrator.trigger(Trigger::OnDemand)
        );

        assert!(matches!(first, UpdateResponse::Completed(_)));
        assert!(matches!(second, UpdateResponse::AlreadyUpdating));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.all().await.unwrap().len(), 1);
        assert!(!orchestrator.is_updating());
    }

    /// Ignores abort and records how many fetches ran at the same time.
    struct StubbornExtractor {
        delay: Duration,
        running: AtomicU32,
        peak: AtomicU32,
        calls: AtomicU32,
    }

    impl StubbornExtractor {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                running: AtomicU32::new(0),
                peak: AtomicU32::new(0),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl PageExtractor for StubbornExtractor {
        fn name(&self) -> &'static str {
            "stubborn"
        }

        fn fetch(&self, _mmsi: u64) -> Result<VesselRecord, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(record_at(Utc::now()))
        }

        fn abort(&self) {}
    }

    #[tokio::test]
    async fn test_timed_out_fetches_never_overlap() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path(), MMSI));
        let extractor = Arc::new(StubbornExtractor::new(Duration::from_millis(300)));

        let mut publisher = MockPublisher::new();
        publisher.expect_publish().times(1).returning(|_| Ok(receipt()));
        publisher.expect_name().return_const("mock");

        let orchestrator = UpdateOrchestrator::new(MMSI, extractor.clone(), store, formatter(), Arc::new(publisher))
            .with_retry_policy(RetryPolicy {
                fetch_timeout: Duration::from_millis(50),
                ..fast_policy(3)
            });

        let outcome = orchestrator.trigger(Trigger::OnDemand).await.outcome().cloned().unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.kind, MessageKind::NoData);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 3);
        assert_eq!(extractor.peak.load(Ordering::SeqCst), 1);
        assert_eq!(extractor.running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_status_polling_does_not_block_triggers() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path(), MMSI));

        let mut extractor = MockPageExtractor::new();
        extractor.expect_fetch().returning(|_| Ok(record_at(Utc::now())));
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().returning(|_| Ok(receipt()));
        publisher.expect_name().return_const("mock");

        let orchestrator = Arc::new(orchestrator(extractor, publisher, store, 1));
        let stop = Arc::new(AtomicBool::new(false));

        let poller = std::thread::spawn({
            let orchestrator = orchestrator.clone();
            let stop = stop.clone();
            move || {
                while !stop.load(Ordering::SeqCst) {
                    let _ = orchestrator.is_updating();
                }
            }
        });

        for _ in 0..50 {
            let response = orchestrator.trigger(Trigger::OnDemand).await;
            assert!(matches!(response, UpdateResponse::Completed(_)));
        }

        stop.store(true, Ordering::SeqCst);
        poller.join().unwrap();
        assert!(!orchestrator.is_updating());
    }
}

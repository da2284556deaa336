use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::models::MessageKind;
use crate::orchestrator::{Trigger, UpdateOrchestrator, UpdateResponse};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickInfo {
    pub job_id: Option<Uuid>,
    pub interval_secs: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    /// Ticks that found a cycle already running.
    pub skipped_count: u64,
    pub last_kind: Option<MessageKind>,
}

/// Fixed-interval ticker feeding scheduled triggers into the orchestrator.
pub struct UpdateScheduler {
    scheduler: JobScheduler,
    orchestrator: Arc<UpdateOrchestrator>,
    config: SchedulerConfig,
    info: Arc<RwLock<TickInfo>>,
}

impl UpdateScheduler {
    pub async fn new(orchestrator: Arc<UpdateOrchestrator>, config: SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        let info = TickInfo {
            interval_secs: config.interval_secs,
            ..TickInfo::default()
        };

        Ok(Self {
            scheduler,
            orchestrator,
            config,
            info: Arc::new(RwLock::new(info)),
        })
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_secs)
    }

    pub async fn start(&mut self) -> Result<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let info = Arc::clone(&self.info);
        let interval = self.interval();

        let job = Job::new_repeated_async(interval, move |_uuid, _l| {
            let orchestrator = Arc::clone(&orchestrator);
            let info = Arc::clone(&info);

            Box::pin(async move {
                Self::execute_tick(orchestrator, info, interval).await;
            })
        })?;

        let job_id = self.scheduler.add(job).await?;
        self.scheduler.start().await?;

        let now = Utc::now();
        {
            let mut info = self.info.write().await;
            info.job_id = Some(job_id);
            info.started_at = Some(now);
            info.next_run = chrono::Duration::from_std(interval).ok().map(|d| now + d);
        }

        tracing::info!("Update scheduler started, interval {:?}", interval);

        if self.config.run_on_start {
            let orchestrator = Arc::clone(&self.orchestrator);
            let info = Arc::clone(&self.info);
            tokio::spawn(async move {
                tracing::info!("Running startup update");
                Self::execute_tick(orchestrator, info, interval).await;
            });
        }

        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        self.info.write().await.next_run = None;
        tracing::info!("Update scheduler shutdown");
        Ok(())
    }

    pub async fn info(&self) -> TickInfo {
        self.info.read().await.clone()
    }

    /// Fire one scheduled tick immediately.
    pub async fn tick(&self) -> UpdateResponse {
        Self::execute_tick(Arc::clone(&self.orchestrator), Arc::clone(&self.info), self.interval()).await
    }

    async fn execute_tick(
        orchestrator: Arc<UpdateOrchestrator>,
        info: Arc<RwLock<TickInfo>>,
        interval: Duration,
    ) -> UpdateResponse {
        let started = Utc::now();
        let response = orchestrator.trigger(Trigger::Scheduled).await;

        let mut info = info.write().await;
        match &response {
            UpdateResponse::Completed(outcome) => {
                info.run_count += 1;
                info.last_run = Some(started);
                info.last_kind = Some(outcome.kind);
                tracing::debug!("Scheduled tick completed with {}", outcome.kind.as_str());
            }
            UpdateResponse::AlreadyUpdating => {
                info.skipped_count += 1;
                tracing::warn!("Scheduled tick skipped: update already in progress");
            }
        }
        if info.started_at.is_some() {
            info.next_run = chrono::Duration::from_std(interval).ok().map(|d| started + d);
        }

        response
    }
}

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::storage::{RecordStore, ScreenshotArchive};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub history_max_age: Duration,
    pub screenshot_max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            history_max_age: Duration::days(30),
            screenshot_max_age: Duration::days(7),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub records_removed: usize,
    pub screenshots_removed: usize,
    /// Deletions that failed and were skipped.
    pub errors: Vec<String>,
}

pub struct Cleaner {
    store: Arc<dyn RecordStore>,
    screenshots: ScreenshotArchive,
    policy: RetentionPolicy,
}

impl Cleaner {
    pub fn new(store: Arc<dyn RecordStore>, screenshots: ScreenshotArchive, policy: RetentionPolicy) -> Self {
        Self {
            store,
            screenshots,
            policy,
        }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Remove history and screenshots past retention. Never fails: every
    /// problem is logged and recorded in the report.
    pub async fn prune(&self, now: DateTime<Utc>) -> CleanupReport {
        let mut report = CleanupReport::default();

        let history_cutoff = now - self.policy.history_max_age;
        match self.store.prune_older_than(history_cutoff).await {
            Ok(removed) => report.records_removed = removed,
            Err(e) => {
                warn!("Failed to prune history: {}", e);
                report.errors.push(e.to_string());
            }
        }

        let screenshot_cutoff = now - self.policy.screenshot_max_age;
        match self.screenshots.list().await {
            Ok(entries) => {
                for entry in entries {
                    let Some(taken_at) = entry.timestamp() else {
                        debug!("Skipping screenshot with unknown age: {}", entry.path.display());
                        continue;
                    };
                    if taken_at >= screenshot_cutoff {
                        continue;
                    }

                    match self.screenshots.remove(&entry.path).await {
                        Ok(()) => {
                            debug!("Deleted old screenshot: {}", entry.path.display());
                            report.screenshots_removed += 1;
                        }
                        Err(e) => {
                            warn!("Failed to delete screenshot {}: {}", entry.path.display(), e);
                            report.errors.push(e.to_string());
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Failed to list screenshots: {}", e);
                report.errors.push(e.to_string());
            }
        }

        if report.records_removed > 0 || report.screenshots_removed > 0 {
            info!(
                "Cleanup removed {} records and {} screenshots",
                report.records_removed, report.screenshots_removed
            );
        }

        report
    }
}

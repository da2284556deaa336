use std::sync::Arc;

use crate::cleaner::Cleaner;
use crate::config::AppConfig;
use crate::formatter::NotificationFormatter;
use crate::orchestrator::UpdateOrchestrator;
use crate::plugins::extractors;
use crate::plugins::notifiers::DiscordPublisher;
use crate::plugins::traits::{PageExtractor, Publisher};
use crate::scraper::{ChromeRenderer, PageRenderer};
use crate::storage::{JsonFileStore, RecordStore, ScreenshotArchive};
use crate::utils::error::Result;

/// Wire the production pipeline: headless Chrome, the configured site
/// extractor and Discord.
pub fn build_orchestrator(config: &AppConfig) -> Result<Arc<UpdateOrchestrator>> {
    let renderer: Arc<dyn PageRenderer> = Arc::new(ChromeRenderer::new(&config.scraper));
    let screenshots = config
        .scraper
        .screenshots
        .then(|| ScreenshotArchive::new(config.screenshot_dir()));

    let extractor = extractors::for_site(&config.scraper, renderer, screenshots)?;
    let publisher: Arc<dyn Publisher> = Arc::new(DiscordPublisher::new(&config.discord)?);

    build_orchestrator_with(config, extractor, publisher)
}

/// Same wiring with caller-supplied extractor and publisher.
pub fn build_orchestrator_with(
    config: &AppConfig,
    extractor: Arc<dyn PageExtractor>,
    publisher: Arc<dyn Publisher>,
) -> Result<Arc<UpdateOrchestrator>> {
    let store: Arc<dyn RecordStore> = Arc::new(JsonFileStore::new(config.history_dir(), config.vessel.mmsi));
    let cleaner = Cleaner::new(
        Arc::clone(&store),
        ScreenshotArchive::new(config.screenshot_dir()),
        config.retention_policy(),
    );
    let formatter = NotificationFormatter::from_config(&config.notifications, config.vessel.nickname.clone())?;

    tracing::info!(
        "Tracking MMSI {} via {} and {}",
        config.vessel.mmsi,
        extractor.name(),
        publisher.name()
    );

    let orchestrator = UpdateOrchestrator::new(config.vessel.mmsi, extractor, store, Arc::new(formatter), publisher)
        .with_cleaner(Arc::new(cleaner))
        .with_retry_policy(config.retry_policy())
        .with_update_interval(config.update_interval());

    Ok(Arc::new(orchestrator))
}

// Page extractor implementations, one per tracking-site layout
pub mod myshiptracking;

use std::sync::Arc;

use crate::config::ScraperConfig;
use crate::plugins::traits::PageExtractor;
use crate::scraper::PageRenderer;
use crate::storage::ScreenshotArchive;
use crate::utils::error::{AppError, Result};

pub use myshiptracking::MyShipTrackingExtractor;

pub const SUPPORTED_SITES: &[&str] = &[myshiptracking::SITE];

/// Build the extractor for `config.site`.
pub fn for_site(
    config: &ScraperConfig,
    renderer: Arc<dyn PageRenderer>,
    screenshots: Option<ScreenshotArchive>,
) -> Result<Arc<dyn PageExtractor>> {
    match config.site.trim().to_lowercase().as_str() {
        myshiptracking::SITE => {
            let mut extractor = MyShipTrackingExtractor::new(renderer, config)?;
            if let Some(archive) = screenshots {
                extractor = extractor.with_screenshots(archive);
            }
            Ok(Arc::new(extractor))
        }
        other => Err(AppError::UnknownSite(other.to_string())),
    }
}

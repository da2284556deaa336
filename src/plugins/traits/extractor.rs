use crate::models::VesselRecord;
use crate::utils::error::ExtractionError;

/// Turns a tracking-site page into a [`VesselRecord`]. One implementation per
/// site layout.
///
/// `fetch` is blocking and never retries on its own; callers run it on a
/// blocking worker and decide what to do with failures.
#[cfg_attr(test, mockall::automock)]
pub trait PageExtractor: Send + Sync {
    /// Site identifier, e.g. `myshiptracking`.
    fn name(&self) -> &'static str;

    fn fetch(&self, mmsi: u64) -> Result<VesselRecord, ExtractionError>;

    /// Tear down whatever `fetch` is blocked on. Called from another thread
    /// when a fetch exceeds its deadline.
    fn abort(&self);
}

pub mod app;
pub mod cleaner;
pub mod config;
pub mod formatter;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod plugins;
pub mod scheduler;
pub mod scraper;
pub mod storage;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use app::{build_orchestrator, build_orchestrator_with};
pub use config::AppConfig;
pub use models::{Course, Message, MessageKind, NewVesselRecord, VesselRecord};
pub use orchestrator::{CycleOutcome, RetryPolicy, Trigger, UpdateOrchestrator, UpdateResponse, UpdateState};
pub use scheduler::UpdateScheduler;
pub use utils::error::{AppError, Result};

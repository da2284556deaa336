use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::utils::error::{AppError, Result};

/// Keeps the file writer flushing; hold it for the life of the process.
#[allow(dead_code)]
pub struct LoggerGuard(WorkerGuard);

fn resolve_level(level: &str) -> &str {
    match level {
        "trace" | "debug" | "info" | "warn" | "error" => level,
        _ => "info",
    }
}

pub fn init_logging(config: &LoggingConfig) -> Result<LoggerGuard> {
    init(&config.dir, &config.prefix, &config.level, config.max_files)
}

fn init(log_dir: &Path, prefix: &str, level: &str, max_files: usize) -> Result<LoggerGuard> {
    let resolved = resolve_level(level);

    let directive = resolved
        .parse()
        .map_err(|e| AppError::Logging(format!("invalid level '{}': {}", resolved, e)))?;
    let builder = EnvFilter::builder().with_default_directive(directive);

    let rust_log = std::env::var("RUST_LOG").unwrap_or_default();
    let console_filter = builder.clone().parse_lossy(&rust_log);
    let file_filter = builder.parse_lossy(&rust_log);

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(max_files.max(1))
        .build(log_dir)
        .map_err(|e| AppError::Logging(format!("failed to create file appender: {}", e)))?;
    let (non_blocking, guard) = NonBlocking::new(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(file_filter);
    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_filter(console_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))?;

    if resolved != level {
        tracing::warn!("Invalid log level '{}', defaulting to 'info'", level);
    }

    Ok(LoggerGuard(guard))
}

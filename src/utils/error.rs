use std::path::PathBuf;
use thiserror::Error;

/// Why a live extraction attempt failed. Every variant is retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Page layout mismatch: {0}")]
    LayoutMismatch(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Consent dialog blocked the page: {0}")]
    ConsentBlocked(String),
}

impl ExtractionError {
    pub fn reason(&self) -> &'static str {
        match self {
            ExtractionError::Network(_) => "network",
            ExtractionError::LayoutMismatch(_) => "layout_mismatch",
            ExtractionError::Timeout(_) => "timeout",
            ExtractionError::ConsentBlocked(_) => "consent_blocked",
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("History file {path} could not be (de)serialized: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Publish rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Publisher misconfigured: {0}")]
    Config(String),
}

/// Raised when an observation violates the record invariants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("Vessel name is empty")]
    EmptyName,

    #[error("Latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("Longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("Speed {0} knots is negative or not a number")]
    InvalidSpeed(f64),

    #[error("Course {0} is outside [0, 360)")]
    CourseOutOfRange(f64),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Invalid record: {0}")]
    Record(#[from] RecordError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown tracking site: {0}")]
    UnknownSite(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

pub mod error;

pub use error::{AppError, ExtractionError, PublishError, RecordError, StoreError};

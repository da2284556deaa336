pub mod extractors;
pub mod notifiers;
pub mod traits;

pub use traits::{PageExtractor, PublishReceipt, Publisher};

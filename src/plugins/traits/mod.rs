pub mod extractor;
pub mod notifier;

pub use extractor::PageExtractor;
pub use notifier::{PublishReceipt, Publisher};

#[cfg(test)]
pub use extractor::MockPageExtractor;
#[cfg(test)]
pub use notifier::MockPublisher;

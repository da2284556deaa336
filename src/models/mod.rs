pub mod message;
pub mod vessel_record;

// Re-exports for convenience
pub use message::*;
pub use vessel_record::*;

// Publisher implementations
pub mod discord;

pub use discord::DiscordPublisher;

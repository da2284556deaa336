use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Message;
use crate::utils::error::PublishError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishReceipt {
    pub message_id: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Delivers formatted messages to a chat channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &'static str;

    async fn publish(&self, message: &Message) -> Result<PublishReceipt, PublishError>;

    /// Check credentials and reachability without posting anything.
    async fn test_connection(&self) -> Result<bool, PublishError>;
}

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use url::Url;
use tracing::{debug, info, warn};

use crate::config::DiscordConfig;
use crate::models::{Message, MessageKind};
use crate::plugins::traits::{PublishReceipt, Publisher};
use crate::utils::error::PublishError;

// Discord embed limits
const TITLE_LIMIT: usize = 256;
const DESCRIPTION_LIMIT: usize = 4096;
const FIELD_NAME_LIMIT: usize = 256;
const FIELD_VALUE_LIMIT: usize = 1024;
const FOOTER_LIMIT: usize = 2048;
const CONTENT_LIMIT: usize = 2000;

#[derive(Debug, Clone, PartialEq)]
pub enum DiscordTarget {
    /// Post as a bot user into a channel.
    Bot { token: String, channel_id: u64 },
    Webhook { url: Url },
}

pub struct DiscordPublisher {
    client: Client,
    target: DiscordTarget,
    api_base: String,
    username: Option<String>,
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}

impl DiscordPublisher {
    pub fn new(config: &DiscordConfig) -> Result<Self, PublishError> {
        let target = match (&config.token, config.channel_id, &config.webhook_url) {
            (Some(token), Some(channel_id), _) if !token.trim().is_empty() => DiscordTarget::Bot {
                token: token.trim().to_string(),
                channel_id,
            },
            (_, _, Some(url)) => DiscordTarget::Webhook {
                url: Url::parse(url.trim())
                    .map_err(|e| PublishError::Config(format!("invalid webhook_url: {}", e)))?,
            },
            _ => {
                return Err(PublishError::Config(
                    "either token and channel_id or webhook_url is required".to_string(),
                ));
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("shipwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            target,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            username: config.username.clone(),
        })
    }

    pub fn target(&self) -> &DiscordTarget {
        &self.target
    }

    fn messages_url(&self) -> String {
        match &self.target {
            DiscordTarget::Bot { channel_id, .. } => format!("{}/channels/{}/messages", self.api_base, channel_id),
            DiscordTarget::Webhook { url } => {
                // Keep thread_id and friends; wait=true is what returns the message id
                let mut url = url.clone();
                let kept: Vec<(String, String)> = url
                    .query_pairs()
                    .filter(|(key, _)| key != "wait")
                    .map(|(key, value)| (key.into_owned(), value.into_owned()))
                    .collect();
                url.query_pairs_mut().clear().extend_pairs(kept).append_pair("wait", "true");
                url.to_string()
            }
        }
    }

    fn create_embed(&self, message: &Message) -> serde_json::Value {
        let fields: Vec<serde_json::Value> = message
            .fields
            .iter()
            .map(|f| {
                json!({
                    "name": truncate(&f.name, FIELD_NAME_LIMIT),
                    "value": truncate(&f.value, FIELD_VALUE_LIMIT),
                    "inline": f.inline
                })
            })
            .collect();

        let mut embed = json!({
            "title": truncate(&message.title, TITLE_LIMIT),
            "description": truncate(&message.description, DESCRIPTION_LIMIT),
            "color": message.color,
            "timestamp": message.timestamp.to_rfc3339(),
            "fields": fields
        });

        if let Some(url) = &message.map_link_url {
            embed["url"] = json!(url);
        }

        if let Some(closing) = &message.closing {
            embed["footer"] = json!({ "text": truncate(closing, FOOTER_LIMIT) });
        }

        embed
    }

    pub fn create_payload(&self, message: &Message) -> serde_json::Value {
        let mut payload = match message.kind {
            MessageKind::NoData => json!({
                "content": truncate(&format!("{}\n{}", message.title, message.description), CONTENT_LIMIT)
            }),
            MessageKind::Live | MessageKind::Stale => json!({
                "embeds": [self.create_embed(message)]
            }),
        };

        // Only webhooks may override the display name
        if let (DiscordTarget::Webhook { .. }, Some(username)) = (&self.target, &self.username) {
            payload["username"] = json!(username);
        }

        payload
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.target {
            DiscordTarget::Bot { token, .. } => request.header("Authorization", format!("Bot {}", token)),
            DiscordTarget::Webhook { .. } => request,
        }
    }
}

#[async_trait]
impl Publisher for DiscordPublisher {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn publish(&self, message: &Message) -> Result<PublishReceipt, PublishError> {
        let payload = self.create_payload(message);
        debug!("Posting {} message to Discord", message.kind.as_str());

        let response = self
            .authorize(self.client.post(self.messages_url()))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            warn!("Discord rejected message with status {}", status);
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message_id = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(|id| id.to_string()));

        info!("Discord message sent{}", message_id.as_ref().map(|id| format!(" ({})", id)).unwrap_or_default());

        Ok(PublishReceipt {
            message_id,
            published_at: Utc::now(),
        })
    }

    async fn test_connection(&self) -> Result<bool, PublishError> {
        let url = match &self.target {
            DiscordTarget::Bot { channel_id, .. } => format!("{}/channels/{}", self.api_base, channel_id),
            DiscordTarget::Webhook { url } => url.to_string(),
        };

        let response = self.authorize(self.client.get(url)).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(true)
        } else if status.is_client_error() {
            warn!("Discord connection test failed with status {}", status);
            Ok(false)
        } else {
            Err(PublishError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

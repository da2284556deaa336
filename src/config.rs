use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::cleaner::RetentionPolicy;
use crate::orchestrator::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub vessel: VesselConfig,
    pub discord: DiscordConfig,
    pub scraper: ScraperConfig,
    pub scheduler: SchedulerConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub notifications: NotificationsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VesselConfig {
    pub mmsi: u64,
    /// Shown under the vessel name, e.g. "My Best Friend Ship".
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub token: Option<String>,
    pub channel_id: Option<u64>,
    pub webhook_url: Option<String>,
    pub api_base: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub site: String,
    pub tracking_url: String,
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub user_agent: String,
    pub page_timeout_secs: u64,
    pub consent_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub screenshots: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub run_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub history_retention_days: u32,
    pub screenshot_retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub closing_messages: Vec<String>,
    pub color_live: u32,
    pub color_stale: u32,
    pub color_no_data: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub prefix: String,
    pub level: String,
    pub max_files: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            channel_id: None,
            webhook_url: None,
            api_base: "https://discord.com/api/v10".to_string(),
            username: None,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            site: "myshiptracking".to_string(),
            tracking_url: "https://www.myshiptracking.com/".to_string(),
            chrome_path: None,
            headless: true,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
            page_timeout_secs: 20,
            consent_timeout_secs: 15,
            fetch_timeout_secs: 90,
            screenshots: true,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 48 * 60 * 60,
            run_on_start: true,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5_000,
            max_delay_ms: 60_000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            history_retention_days: 30,
            screenshot_retention_days: 7,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            closing_messages: vec![
                "Fair winds and following seas! ⛵".to_string(),
                "Smooth sailing, see you next update! 🌊".to_string(),
                "Keep that hull wet, old friend. ⚓".to_string(),
                "Until the next port of call! 🧭".to_string(),
                "May the tides be kind. 🐚".to_string(),
            ],
            color_live: 0x0099ff,
            color_stale: 0xff9900,
            color_no_data: 0xff0000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            prefix: "shipwatch".to_string(),
            level: "info".to_string(),
            max_files: 14,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load("config")
    }

    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name(&format!("{}/local", config_dir)).required(false))
            // Add environment variables with prefix "SHIPWATCH__"
            .add_source(
                Environment::with_prefix("SHIPWATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator("|")
                    .with_list_parse_key("notifications.closing_messages"),
            )
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        config.apply_legacy_env();
        config.validate()?;
        Ok(config)
    }

    /// Honour the bare variable names used by older deployments.
    fn apply_legacy_env(&mut self) {
        if self.discord.token.is_none() {
            self.discord.token = env::var("DISCORD_TOKEN").ok().filter(|t| !t.is_empty());
        }
        if self.discord.channel_id.is_none() {
            self.discord.channel_id = env::var("CHANNEL_ID").ok().and_then(|v| v.parse().ok());
        }
        if self.vessel.mmsi == 0 {
            if let Some(mmsi) = env::var("SHIP_MMSI").ok().and_then(|v| v.parse().ok()) {
                self.vessel.mmsi = mmsi;
            }
        }
        if self.scraper.chrome_path.is_none() {
            self.scraper.chrome_path = env::var("CHROME_PATH").ok();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // MMSI is always nine digits
        if !(100_000_000..=999_999_999).contains(&self.vessel.mmsi) {
            return Err(ConfigError::Message("Vessel MMSI must be a 9-digit number".into()));
        }

        // Discord: either bot token + channel, or a webhook
        let has_bot = self.discord.token.is_some() && self.discord.channel_id.is_some();
        match &self.discord.webhook_url {
            Some(url) if !url.starts_with("https://discord.com/api/webhooks/") => {
                return Err(ConfigError::Message("Invalid Discord webhook URL format".into()));
            }
            None if !has_bot => {
                return Err(ConfigError::Message(
                    "Discord requires either token and channel_id or webhook_url".into(),
                ));
            }
            _ => {}
        }

        if Url::parse(&self.discord.api_base).is_err() {
            return Err(ConfigError::Message("Invalid Discord API base URL".into()));
        }

        if Url::parse(&self.scraper.tracking_url).is_err() {
            return Err(ConfigError::Message("Invalid tracking URL format".into()));
        }

        if self.scraper.page_timeout_secs == 0 || self.scraper.fetch_timeout_secs == 0 {
            return Err(ConfigError::Message("Scraper timeouts must be greater than 0".into()));
        }

        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::Message("Scheduler interval must be greater than 0".into()));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Message("Retry max_attempts must be greater than 0".into()));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Message("Retry base_delay_ms cannot exceed max_delay_ms".into()));
        }

        if self.notifications.closing_messages.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::Message("At least one closing message is required".into()));
        }

        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port must be greater than 0".into()));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        Ok(())
    }

    pub fn update_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.scheduler.interval_secs as i64)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            fetch_timeout: Duration::from_secs(self.scraper.fetch_timeout_secs),
        }
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            history_max_age: chrono::Duration::days(self.storage.history_retention_days as i64),
            screenshot_max_age: chrono::Duration::days(self.storage.screenshot_retention_days as i64),
        }
    }

    pub fn history_dir(&self) -> PathBuf {
        self.storage.data_dir.join("history")
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.storage.data_dir.join("screenshots")
    }
}

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use crate::config::NotificationsConfig;
use crate::models::{Course, EmbedField, Message, MessageKind, VesselRecord};
use crate::utils::error::{AppError, Result};

pub const FIELD_POSITION: &str = "📍 Position";
pub const FIELD_SPEED_COURSE: &str = "⚡ Speed & Course";
pub const FIELD_TYPE: &str = "🚢 Vessel Type";
pub const FIELD_CAPTURED: &str = "🕒 Captured";
pub const FIELD_STALE: &str = "⚠️ Stale Data";
pub const FIELD_MAP: &str = "🗺️ View on Map";

/// Per-call inputs that are not part of the record itself.
#[derive(Debug, Clone)]
pub struct FormatContext {
    pub now: DateTime<Utc>,
    pub update_interval: Duration,
    /// Set when the record is being published because a live fetch failed.
    pub fallback: bool,
}

impl FormatContext {
    pub fn live(now: DateTime<Utc>, update_interval: Duration) -> Self {
        Self {
            now,
            update_interval,
            fallback: false,
        }
    }

    pub fn fallback(now: DateTime<Utc>, update_interval: Duration) -> Self {
        Self {
            now,
            update_interval,
            fallback: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub live: u32,
    pub stale: u32,
    pub no_data: u32,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            live: 0x0099ff,
            stale: 0xff9900,
            no_data: 0xff0000,
        }
    }
}

/// Picks one closing line per message from a fixed list.
pub struct ClosingSelector {
    messages: Vec<String>,
    rng: Mutex<StdRng>,
}

impl ClosingSelector {
    pub fn new(messages: Vec<String>) -> Result<Self> {
        Self::with_rng(messages, StdRng::from_entropy())
    }

    /// Deterministic selector for tests and reproducible runs.
    pub fn seeded(messages: Vec<String>, seed: u64) -> Result<Self> {
        Self::with_rng(messages, StdRng::seed_from_u64(seed))
    }

    fn with_rng(messages: Vec<String>, rng: StdRng) -> Result<Self> {
        let messages: Vec<String> = messages
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();

        if messages.is_empty() {
            return Err(AppError::Internal("closing message list is empty".to_string()));
        }

        Ok(Self {
            messages,
            rng: Mutex::new(rng),
        })
    }

    pub fn choose(&self) -> &str {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let index = rng.gen_range(0..self.messages.len());
        &self.messages[index]
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

pub struct NotificationFormatter {
    selector: ClosingSelector,
    palette: Palette,
    nickname: Option<String>,
}

impl NotificationFormatter {
    pub fn new(selector: ClosingSelector) -> Self {
        Self {
            selector,
            palette: Palette::default(),
            nickname: None,
        }
    }

    pub fn from_config(config: &NotificationsConfig, nickname: Option<String>) -> Result<Self> {
        let selector = ClosingSelector::new(config.closing_messages.clone())?;
        Ok(Self::new(selector)
            .with_palette(Palette {
                live: config.color_live,
                stale: config.color_stale,
                no_data: config.color_no_data,
            })
            .with_nickname(nickname))
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    pub fn with_nickname(mut self, nickname: Option<String>) -> Self {
        self.nickname = nickname.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn format(&self, record: &VesselRecord, ctx: &FormatContext) -> Message {
        let stale = ctx.fallback || record.is_stale(ctx.now, ctx.update_interval);
        let map_url = map_link(record.latitude(), record.longitude());

        let mut fields = vec![
            EmbedField::new(
                FIELD_POSITION,
                format!(
                    "Lat: {}\nLon: {}",
                    format_latitude(record.latitude()),
                    format_longitude(record.longitude())
                ),
                true,
            ),
            EmbedField::new(
                FIELD_SPEED_COURSE,
                format!("{:.1} knots\nCourse: {}", record.speed_knots(), format_course(record.course())),
                true,
            ),
            EmbedField::new(FIELD_TYPE, non_empty_or(record.vessel_type(), "Unknown"), true),
            EmbedField::new(
                FIELD_CAPTURED,
                record.captured_at().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                true,
            ),
        ];

        if stale {
            fields.push(EmbedField::new(
                FIELD_STALE,
                format!(
                    "Live tracking is unavailable. This position is {} old.",
                    describe_age(record.age(ctx.now))
                ),
                false,
            ));
        }

        fields.push(EmbedField::new(
            FIELD_MAP,
            format!("[Click here to view location]({})", map_url),
            false,
        ));

        let (kind, title, color) = if stale {
            (MessageKind::Stale, "🚢 Last known position", self.palette.stale)
        } else {
            (MessageKind::Live, "🚢 Ship Location Update", self.palette.live)
        };

        Message {
            kind,
            title: title.to_string(),
            description: self.describe_vessel(record.name(), record.mmsi()),
            fields,
            map_link_url: Some(map_url),
            closing: Some(self.selector.choose().to_string()),
            color,
            timestamp: ctx.now,
        }
    }

    /// Notice sent when extraction failed and nothing has ever been stored.
    pub fn format_no_data(&self, mmsi: u64, ctx: &FormatContext) -> Message {
        Message {
            kind: MessageKind::NoData,
            title: "❌ No data available".to_string(),
            description: format!(
                "Could not fetch ship location data for MMSI {} and no earlier position is on record.",
                mmsi
            ),
            fields: Vec::new(),
            map_link_url: None,
            closing: None,
            color: self.palette.no_data,
            timestamp: ctx.now,
        }
    }

    fn describe_vessel(&self, name: &str, mmsi: u64) -> String {
        match &self.nickname {
            Some(nickname) => format!("**{}** - {}\nMMSI {}", name, nickname, mmsi),
            None => format!("**{}**\nMMSI {}", name, mmsi),
        }
    }
}

pub fn map_link(latitude: f64, longitude: f64) -> String {
    format!("https://www.google.com/maps?q={:.6},{:.6}", latitude, longitude)
}

/// Recover the coordinates embedded by [`map_link`].
pub fn parse_map_link(link: &str) -> Option<(f64, f64)> {
    let url = url::Url::parse(link).ok()?;
    let (_, q) = url.query_pairs().find(|(key, _)| key == "q")?;
    let (lat, lon) = q.split_once(',')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

pub fn format_latitude(latitude: f64) -> String {
    let hemisphere = if latitude < 0.0 { 'S' } else { 'N' };
    format!("{:.4}° {}", latitude.abs(), hemisphere)
}

pub fn format_longitude(longitude: f64) -> String {
    let hemisphere = if longitude < 0.0 { 'W' } else { 'E' };
    format!("{:.4}° {}", longitude.abs(), hemisphere)
}

fn format_course(course: Course) -> String {
    course.to_string()
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}

pub fn describe_age(age: Duration) -> String {
    let minutes = age.num_minutes().max(0);
    let days = minutes / (60 * 24);
    let hours = (minutes / 60) % 24;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}

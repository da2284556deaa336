use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ScraperConfig;
use crate::models::{Course, NewVesselRecord, VesselRecord};
use crate::plugins::traits::PageExtractor;
use crate::scraper::{ConsentProbe, PageRenderer, RenderRequest};
use crate::storage::ScreenshotArchive;
use crate::utils::error::{AppError, ExtractionError, Result};

pub const SITE: &str = "myshiptracking";

/// Rendered once the vessel header is on the page.
const READY_SELECTOR: &str = "h1";

/// Where the vessel details live, most specific first.
const PANEL_SELECTORS: &[&str] = &["#vsl-info-card", ".vessel-details", "main", "body"];

pub struct MyShipTrackingExtractor {
    renderer: Arc<dyn PageRenderer>,
    tracking_url: Url,
    page_timeout: Duration,
    consent_timeout: Duration,
    consent: ConsentProbe,
    screenshots: Option<ScreenshotArchive>,
}

impl MyShipTrackingExtractor {
    pub fn new(renderer: Arc<dyn PageRenderer>, config: &ScraperConfig) -> Result<Self> {
        let tracking_url = Url::parse(&config.tracking_url)
            .map_err(|e| AppError::Internal(format!("Invalid tracking URL '{}': {}", config.tracking_url, e)))?;

        Ok(Self {
            renderer,
            tracking_url,
            page_timeout: Duration::from_secs(config.page_timeout_secs),
            consent_timeout: Duration::from_secs(config.consent_timeout_secs),
            consent: ConsentProbe::default(),
            screenshots: None,
        })
    }

    pub fn with_screenshots(mut self, archive: ScreenshotArchive) -> Self {
        self.screenshots = Some(archive);
        self
    }

    pub fn vessel_url(&self, mmsi: u64) -> String {
        let mut url = self.tracking_url.clone();
        url.query_pairs_mut().clear().append_pair("mmsi", &mmsi.to_string());
        url.to_string()
    }
}

impl PageExtractor for MyShipTrackingExtractor {
    fn name(&self) -> &'static str {
        SITE
    }

    fn fetch(&self, mmsi: u64) -> std::result::Result<VesselRecord, ExtractionError> {
        let request = RenderRequest {
            url: self.vessel_url(mmsi),
            ready_selector: READY_SELECTOR.to_string(),
            consent: self.consent.clone(),
            page_timeout: self.page_timeout,
            consent_timeout: self.consent_timeout,
            screenshot: self.screenshots.is_some(),
        };

        let page = self.renderer.render(&request)?;
        let captured_at = Utc::now();
        info!("Rendered {} in {:?}", page.final_url, page.elapsed);

        if let (Some(archive), Some(png)) = (&self.screenshots, &page.screenshot) {
            match archive.save(&format!("mmsi_{}", mmsi), captured_at, png) {
                Ok(path) => debug!("Saved screenshot to {}", path.display()),
                Err(e) => warn!("Failed to save screenshot: {}", e),
            }
        }

        parse_vessel_page(&page.html, mmsi, captured_at)
    }

    fn abort(&self) {
        self.renderer.abort();
    }
}

struct Patterns {
    name: Regex,
    vessel_type: Regex,
    course_speed: Regex,
    speed: Regex,
    course: Regex,
    hemisphere: Regex,
    lat_lon: Regex,
    position_pair: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        name: Regex::new(r"(?im)^(?:vessel\s+|ship\s+)?name\s*:?[ \t]*\n?[ \t]*([^\n]+)$").expect("name regex"),
        vessel_type: Regex::new(r"(?im)^(?:vessel\s+|ship\s+)?type\s*:?[ \t]*\n?[ \t]*([^\n]+)$").expect("type regex"),
        course_speed: Regex::new(
            r"(?im)^course\s*/\s*speed\s*:?\s*(\d+(?:\.\d+)?|-+|n/?a|unknown)\s*°?\s*/\s*(\d+(?:\.\d+)?)",
        )
        .expect("course/speed regex"),
        speed: Regex::new(r"(?im)^(?:speed(?:\s+over\s+ground)?|sog)\s*:?\s*(\d+(?:\.\d+)?)").expect("speed regex"),
        course: Regex::new(r"(?im)^(?:course(?:\s+over\s+ground)?|cog)\s*:?\s*(\d+(?:\.\d+)?|-+|n/?a|unknown)")
            .expect("course regex"),
        hemisphere: Regex::new(
            r"\b(\d+(?:\.\d+)?)\s*°?\s*([NS])\b\s*[,/ ]?\s*\b(\d+(?:\.\d+)?)\s*°?\s*([EW])\b",
        )
        .expect("hemisphere regex"),
        lat_lon: Regex::new(
            r"(?is)\blat(?:itude)?\b\s*:?\s*(-?\d+(?:\.\d+)?).{0,40}?\blon(?:gitude)?\b\s*:?\s*(-?\d+(?:\.\d+)?)",
        )
        .expect("lat/lon regex"),
        position_pair: Regex::new(r"(?im)^position\s*:?\s*(-?\d+(?:\.\d+)?)\s*[,/ ]\s*(-?\d+(?:\.\d+)?)")
            .expect("position regex"),
    })
}

/// Visible text of the first matching panel, one trimmed text node per line.
fn panel_text(document: &Html) -> Option<String> {
    for selector in PANEL_SELECTORS {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        let Some(panel) = document.select(&selector).next() else {
            continue;
        };

        let lines: Vec<&str> = panel
            .descendants()
            .filter(|node| {
                let parent = node.parent().and_then(|p| p.value().as_element().map(|e| e.name()));
                !matches!(parent, Some("script") | Some("style") | Some("noscript"))
            })
            .filter_map(|node| node.value().as_text())
            .map(|text| text.trim())
            .filter(|text| !text.is_empty())
            .collect();

        if !lines.is_empty() {
            return Some(lines.join("\n"));
        }
    }
    None
}

fn heading(document: &Html) -> Option<String> {
    let selector = Selector::parse("h1").ok()?;
    document
        .select(&selector)
        .map(|h| h.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|text| !text.is_empty())
}

fn parse_number(raw: &str, field: &str) -> std::result::Result<f64, ExtractionError> {
    raw.parse::<f64>()
        .map_err(|_| ExtractionError::LayoutMismatch(format!("{} value '{}' is not a number", field, raw)))
}

fn parse_course(raw: &str) -> std::result::Result<Course, ExtractionError> {
    let raw = raw.trim();
    if raw.chars().all(|c| c == '-') || raw.eq_ignore_ascii_case("n/a") || raw.eq_ignore_ascii_case("na")
        || raw.eq_ignore_ascii_case("unknown")
    {
        return Ok(Course::Unknown);
    }
    let degrees = parse_number(raw, "course")?;
    // Some layouts print 360 for due north
    let degrees = if degrees == 360.0 { 0.0 } else { degrees };
    Course::from_degrees(degrees).map_err(|e| ExtractionError::LayoutMismatch(e.to_string()))
}

fn parse_position(text: &str) -> std::result::Result<(f64, f64), ExtractionError> {
    let p = patterns();

    if let Some(caps) = p.hemisphere.captures(text) {
        let mut lat = parse_number(&caps[1], "latitude")?;
        let mut lon = parse_number(&caps[3], "longitude")?;
        if &caps[2] == "S" {
            lat = -lat;
        }
        if &caps[4] == "W" {
            lon = -lon;
        }
        return Ok((lat, lon));
    }

    if let Some(caps) = p.lat_lon.captures(text).or_else(|| p.position_pair.captures(text)) {
        return Ok((parse_number(&caps[1], "latitude")?, parse_number(&caps[2], "longitude")?));
    }

    Err(ExtractionError::LayoutMismatch("position marker not found".to_string()))
}

/// Parse a rendered vessel page. The MMSI is taken from the caller, never
/// from the page.
pub fn parse_vessel_page(
    html: &str,
    mmsi: u64,
    captured_at: DateTime<Utc>,
) -> std::result::Result<VesselRecord, ExtractionError> {
    let document = Html::parse_document(html);
    let text = panel_text(&document)
        .ok_or_else(|| ExtractionError::LayoutMismatch("vessel panel is empty".to_string()))?;
    debug!("Parsing {} characters of panel text", text.len());

    let p = patterns();

    let name = heading(&document)
        .or_else(|| p.name.captures(&text).map(|c| c[1].trim().to_string()))
        .ok_or_else(|| ExtractionError::LayoutMismatch("vessel name not found".to_string()))?;

    let vessel_type = p
        .vessel_type
        .captures(&text)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();

    let (speed_knots, course) = if let Some(caps) = p.course_speed.captures(&text) {
        (parse_number(&caps[2], "speed")?, parse_course(&caps[1])?)
    } else {
        let speed = p
            .speed
            .captures(&text)
            .ok_or_else(|| ExtractionError::LayoutMismatch("speed marker not found".to_string()))?;
        let course = p
            .course
            .captures(&text)
            .ok_or_else(|| ExtractionError::LayoutMismatch("course marker not found".to_string()))?;
        (parse_number(&speed[1], "speed")?, parse_course(&course[1])?)
    };

    let (latitude, longitude) = parse_position(&text)?;

    VesselRecord::new(NewVesselRecord {
        name,
        mmsi,
        latitude,
        longitude,
        speed_knots,
        course,
        vessel_type,
        captured_at,
    })
    .map_err(|e| ExtractionError::LayoutMismatch(e.to_string()))
}

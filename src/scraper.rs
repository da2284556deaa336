use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::utils::error::ExtractionError;

/// How to recognise and dismiss a cookie/consent overlay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsentProbe {
    /// Present while the overlay blocks the page.
    pub container: String,
    /// Candidate buttons, most specific first.
    pub buttons: Vec<String>,
    /// Lower-case words that mark an accepting button.
    pub keywords: Vec<String>,
    /// Elements removed by script when no button works.
    pub overlays: Vec<String>,
}

impl Default for ConsentProbe {
    fn default() -> Self {
        Self {
            container: ".fc-dialog-container".to_string(),
            buttons: vec![
                "button.fc-cta-consent".to_string(),
                ".fc-dialog-container button".to_string(),
                "button[id*='accept']".to_string(),
                "button[class*='accept']".to_string(),
                "button[class*='consent']".to_string(),
                "button".to_string(),
            ],
            keywords: ["agree", "accept", "consent", "allow", "ok", "continue"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            overlays: vec![
                ".fc-consent-root".to_string(),
                ".fc-dialog-overlay".to_string(),
                ".fc-dialog-container".to_string(),
            ],
        }
    }
}

impl ConsentProbe {
    pub fn is_accept_label(&self, label: &str) -> bool {
        let label = label.trim().to_lowercase();
        if label.is_empty() {
            return false;
        }
        self.keywords.iter().any(|k| {
            // "ok" is short enough to need a word match
            if k.len() <= 2 {
                label.split(|c: char| !c.is_alphanumeric()).any(|w| w == k)
            } else {
                label.contains(k.as_str())
            }
        })
    }

    fn removal_script(&self) -> String {
        let selectors = serde_json::to_string(&self.overlays).unwrap_or_else(|_| "[]".to_string());
        format!(
            "(function() {{ let n = 0; for (const s of {}) {{ document.querySelectorAll(s).forEach(e => {{ e.remove(); n++; }}); }} document.body.style.overflow = 'auto'; return n; }})()",
            selectors
        )
    }
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub url: String,
    /// Selector that signals the data panel has rendered.
    pub ready_selector: String,
    pub consent: ConsentProbe,
    pub page_timeout: Duration,
    pub consent_timeout: Duration,
    pub screenshot: bool,
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    pub final_url: String,
    pub screenshot: Option<Vec<u8>>,
    pub consent_dismissed: bool,
    pub elapsed: Duration,
}

/// A browser able to load a page and hand back its rendered markup.
/// `render` blocks the calling thread.
pub trait PageRenderer: Send + Sync {
    fn render(&self, request: &RenderRequest) -> Result<RenderedPage, ExtractionError>;

    /// Tear down any in-flight session. Safe to call from another thread.
    fn abort(&self);
}

/// Holds the live session tagged with the generation that installed it, so a
/// render finishing late can only release its own session.
struct SessionSlot<T> {
    current: Mutex<Option<(u64, T)>>,
    next: AtomicU64,
}

impl<T> SessionSlot<T> {
    fn new() -> Self {
        Self {
            current: Mutex::new(None),
            next: AtomicU64::new(1),
        }
    }

    /// Replaces whatever is installed; the displaced value is dropped.
    fn install(&self, value: T) -> u64 {
        let generation = self.next.fetch_add(1, Ordering::SeqCst);
        let displaced = self
            .current
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .replace((generation, value));
        drop(displaced);
        generation
    }

    fn release(&self, generation: u64) -> Option<T> {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        match current.as_ref() {
            Some((installed, _)) if *installed == generation => current.take().map(|(_, value)| value),
            _ => None,
        }
    }

    fn take(&self) -> Option<T> {
        self.current
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .map(|(_, value)| value)
    }

    fn is_empty(&self) -> bool {
        self.current.lock().unwrap_or_else(|p| p.into_inner()).is_none()
    }
}

/// Headless Chrome, one fresh browser per render.
pub struct ChromeRenderer {
    headless: bool,
    chrome_path: Option<PathBuf>,
    user_agent: String,
    idle_timeout: Duration,
    session: SessionSlot<Browser>,
}

impl ChromeRenderer {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            headless: config.headless,
            chrome_path: config.chrome_path.as_ref().map(PathBuf::from),
            user_agent: config.user_agent.clone(),
            idle_timeout: Duration::from_secs(config.fetch_timeout_secs.max(30)),
            session: SessionSlot::new(),
        }
    }

    fn launch(&self) -> Result<Browser, ExtractionError> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(self.headless)
            .sandbox(false) // Often needed in containerized environments
            .window_size(Some((1920, 1080)))
            .idle_browser_timeout(self.idle_timeout)
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
            ])
            .build()
            .map_err(|e| ExtractionError::Network(format!("Failed to create launch options: {}", e)))?;

        if let Some(chrome_path) = &self.chrome_path {
            launch_options.path = Some(chrome_path.clone());
        }

        Browser::new(launch_options)
            .map_err(|e| ExtractionError::Network(format!("Failed to launch browser: {}", e)))
    }

    fn open_tab(&self) -> Result<(u64, Arc<Tab>), ExtractionError> {
        let browser = self.launch()?;
        let tab = browser
            .new_tab()
            .map_err(|e| ExtractionError::Network(format!("Failed to create tab: {}", e)))?;

        // The slot owns the only Browser handle so abort() can kill it.
        let generation = self.session.install(browser);
        Ok((generation, tab))
    }

    fn drive(&self, tab: &Tab, request: &RenderRequest) -> Result<RenderedPage, ExtractionError> {
        let start = Instant::now();
        tab.set_default_timeout(request.page_timeout);

        tab.set_user_agent(&self.user_agent, None, None)
            .map_err(|e| ExtractionError::Network(format!("Failed to set user agent: {}", e)))?;

        info!("Loading {}", request.url);
        tab.navigate_to(&request.url)
            .map_err(|e| ExtractionError::Network(format!("Navigation failed: {}", e)))?;
        tab.wait_until_navigated()
            .map_err(|e| ExtractionError::Network(format!("Page load failed: {}", e)))?;

        let consent_dismissed = dismiss_consent(tab, &request.consent, request.consent_timeout)?;

        tab.wait_for_element_with_custom_timeout(&request.ready_selector, request.page_timeout)
            .map_err(|e| {
                ExtractionError::Timeout(format!(
                    "Wait for selector '{}' failed: {}",
                    request.ready_selector, e
                ))
            })?;

        let html = tab
            .get_content()
            .map_err(|e| ExtractionError::Network(format!("Failed to get page content: {}", e)))?;

        let final_url = {
            let url = tab.get_url();
            if url.is_empty() { request.url.clone() } else { url }
        };

        let screenshot = if request.screenshot {
            match tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true) {
                Ok(png) => Some(png),
                Err(e) => {
                    warn!("Screenshot capture failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let _ = tab.close(true);

        Ok(RenderedPage {
            html,
            final_url,
            screenshot,
            consent_dismissed,
            elapsed: start.elapsed(),
        })
    }
}

impl PageRenderer for ChromeRenderer {
    fn render(&self, request: &RenderRequest) -> Result<RenderedPage, ExtractionError> {
        let (generation, tab) = self.open_tab()?;
        let result = self.drive(&tab, request);
        drop(tab);
        drop(self.session.release(generation));
        result
    }

    fn abort(&self) {
        if let Some(browser) = self.session.take() {
            warn!("Aborting browser session");
            drop(browser);
        }
    }
}

fn overlay_present(tab: &Tab, probe: &ConsentProbe) -> bool {
    tab.find_element(&probe.container).is_ok()
}

/// Returns whether an overlay was found and dismissed. An overlay that is
/// still present at the deadline is `ConsentBlocked`.
fn dismiss_consent(tab: &Tab, probe: &ConsentProbe, timeout: Duration) -> Result<bool, ExtractionError> {
    if !overlay_present(tab, probe) {
        debug!("No consent overlay present");
        return Ok(false);
    }

    info!("Consent overlay detected, attempting to dismiss");
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        for selector in &probe.buttons {
            let Ok(buttons) = tab.find_elements(selector) else {
                continue;
            };
            for button in buttons {
                let label = button.get_inner_text().unwrap_or_default();
                if !probe.is_accept_label(&label) {
                    continue;
                }
                debug!("Clicking consent button '{}' ({})", label.trim(), selector);
                if button.click().is_ok() {
                    std::thread::sleep(Duration::from_millis(500));
                    if !overlay_present(tab, probe) {
                        info!("Consent overlay dismissed");
                        return Ok(true);
                    }
                }
            }
        }
        std::thread::sleep(Duration::from_millis(500));
    }

    // Last resort: strip the overlay elements from the DOM
    if let Err(e) = tab.evaluate(&probe.removal_script(), false) {
        warn!("Consent overlay removal script failed: {}", e);
    }
    if overlay_present(tab, probe) {
        return Err(ExtractionError::ConsentBlocked(format!(
            "'{}' still present after {:?}",
            probe.container, timeout
        )));
    }

    info!("Consent overlay removed by script");
    Ok(true)
}

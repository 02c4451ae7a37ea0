//! Headless Chrome/Chromium session behind [`PageDriver`].
//!
//! Every in-page step is one expression evaluated to completion with
//! `awaitPromise`. Readiness waits that can outlast a single devtools
//! request (load, network idle) are polled with short evaluations instead,
//! so the caller's navigation timeout is the only deadline.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::ClonerConfig;
use crate::discover::{DomQuery, FontFaceSheet};
use crate::error::DriverError;
use crate::page::{OverlayTarget, PageDriver};

/// Elements a text-matched overlay click may land on.
const CLICKABLE: &str =
    r#"button, a, [role="button"], input[type="button"], input[type="submit"]"#;

/// Installs a resource counter fed by a `PerformanceObserver`, which is not
/// capped by the resource timing buffer. Evaluates to the current count.
const RESOURCE_COUNT_SCRIPT: &str = r#"(() => {
    if (window.__resourceCount === undefined) {
        window.__resourceCount = performance.getEntriesByType('resource').length;
        try { performance.setResourceTimingBufferSize(100000); } catch (e) {}
        new PerformanceObserver(list => {
            window.__resourceCount += list.getEntries().length;
        }).observe({ type: 'resource' });
    }
    return window.__resourceCount;
})()"#;

/// Network is idle once no new resource has started for this long.
const NETWORK_QUIET: Duration = Duration::from_millis(500);
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

const LOAD_SCRIPT: &str = "document.readyState === 'complete'";

const DOCUMENT_HEIGHT_SCRIPT: &str =
    "(document.body || document.documentElement).scrollHeight";

const IMAGES_SCRIPT: &str = r#"Promise.all(
    Array.from(document.images)
        .filter(img => !img.complete)
        .map(img => new Promise(resolve => { img.onload = img.onerror = resolve; }))
).then(() => true)"#;

const STYLESHEETS_SCRIPT: &str =
    r#"Array.from(document.querySelectorAll('link[rel="stylesheet"]')).map(link => link.href)"#;

const SCRIPTS_SCRIPT: &str =
    "Array.from(document.querySelectorAll('script[src]')).map(script => script.src)";

const IMAGES_SRC_SCRIPT: &str =
    "Array.from(document.querySelectorAll('img[src]')).map(img => img.src)";

const BACKGROUNDS_SCRIPT: &str = r#"Array.from(document.querySelectorAll('*'))
    .map(el => window.getComputedStyle(el).backgroundImage)
    .filter(bg => bg && bg !== 'none')"#;

const SVG_OBJECTS_SCRIPT: &str =
    r#"Array.from(document.querySelectorAll('object[type="image/svg+xml"]')).map(obj => obj.data)"#;

const FONT_FACES_SCRIPT: &str = r#"(() => Array.from(document.styleSheets).map(sheet => {
    try {
        const sources = [];
        for (const rule of sheet.cssRules) {
            if (rule instanceof CSSFontFaceRule) {
                sources.push(rule.style.getPropertyValue('src'));
            }
        }
        return { href: sheet.href, sources };
    } catch (e) {
        return { href: sheet.href, error: String(e) };
    }
}))()"#;

/// Tracks successive resource counts until they stop changing for
/// [`NETWORK_QUIET`].
#[derive(Debug)]
struct QuietWindow {
    last_count: Option<u64>,
    quiet_since: Instant,
}

impl QuietWindow {
    fn new(now: Instant) -> Self {
        Self {
            last_count: None,
            quiet_since: now,
        }
    }

    /// Record a sample. True once the count has held still long enough.
    fn observe(&mut self, count: u64, now: Instant) -> bool {
        if self.last_count != Some(count) {
            self.last_count = Some(count);
            self.quiet_since = now;
            return false;
        }
        now.duration_since(self.quiet_since) >= NETWORK_QUIET
    }
}

/// Raw shape of one entry from [`FONT_FACES_SCRIPT`].
#[derive(Debug, Deserialize)]
struct RawFontFaceSheet {
    href: Option<String>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

impl From<RawFontFaceSheet> for FontFaceSheet {
    fn from(raw: RawFontFaceSheet) -> Self {
        FontFaceSheet {
            href: raw.href,
            sources: match raw.error {
                Some(error) => Err(error),
                None => Ok(raw.sources),
            },
        }
    }
}

/// Script for a single click attempt on `target`. Evaluates to whether a
/// visible element was clicked.
pub fn overlay_click_script(target: &OverlayTarget) -> String {
    let (selector, needle) = match target {
        OverlayTarget::Text(text) => (CLICKABLE, Some(*text)),
        OverlayTarget::ButtonText(text) => ("button", Some(*text)),
        OverlayTarget::Css(selector) => (*selector, None),
    };
    let selector = js_string(selector);

    match needle {
        Some(text) => format!(
            r#"(() => {{
    const needle = {needle}.toLowerCase();
    for (const el of document.querySelectorAll({selector})) {{
        const text = (el.innerText || el.value || '').toLowerCase();
        if (text.includes(needle) && el.offsetParent !== null) {{ el.click(); return true; }}
    }}
    return false;
}})()"#,
            needle = js_string(text),
        ),
        None => format!(
            r#"(() => {{
    const el = document.querySelector({selector});
    if (el && el.offsetParent !== null) {{ el.click(); return true; }}
    return false;
}})()"#
        ),
    }
}

fn js_string(value: &str) -> String {
    // A JSON string literal is a valid JS string literal.
    serde_json::Value::String(value.to_string()).to_string()
}

/// One browser process with one page.
pub struct ChromeDriver {
    browser: Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    closed: bool,
}

impl ChromeDriver {
    pub async fn launch(config: &ClonerConfig) -> Result<Self, DriverError> {
        info!(headless = config.headless, "launching browser");

        let mut builder = BrowserConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .request_timeout(config.navigation_timeout())
            .viewport(Some(Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
                device_scale_factor: Some(1.0),
                ..Default::default()
            }))
            .arg(format!("--user-agent={}", config.user_agent))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");

        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(ref chrome_path) = config.chrome_path {
            builder = builder.chrome_executable(chrome_path);
        }

        let browser_config = builder.build().map_err(DriverError::Launch)?;
        let (mut browser, mut handler) = Browser::launch(browser_config).await?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler error: {e}");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    warn!("failed to close browser: {close_err}");
                }
                handler.abort();
                return Err(e.into());
            }
        };

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler,
            closed: false,
        })
    }

    async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T, DriverError> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(DriverError::Evaluation)?;
        let result = self.page.evaluate_expression(params).await?;
        Ok(result.into_value()?)
    }
}

#[async_trait]
impl DomQuery for ChromeDriver {
    async fn stylesheet_links(&self) -> Result<Vec<String>, DriverError> {
        self.eval(STYLESHEETS_SCRIPT).await
    }

    async fn script_sources(&self) -> Result<Vec<String>, DriverError> {
        self.eval(SCRIPTS_SCRIPT).await
    }

    async fn image_sources(&self) -> Result<Vec<String>, DriverError> {
        self.eval(IMAGES_SRC_SCRIPT).await
    }

    async fn background_images(&self) -> Result<Vec<String>, DriverError> {
        self.eval(BACKGROUNDS_SCRIPT).await
    }

    async fn svg_objects(&self) -> Result<Vec<String>, DriverError> {
        self.eval(SVG_OBJECTS_SCRIPT).await
    }

    async fn font_faces(&self) -> Result<Vec<FontFaceSheet>, DriverError> {
        let sheets: Vec<RawFontFaceSheet> = self.eval(FONT_FACES_SCRIPT).await?;
        Ok(sheets.into_iter().map(FontFaceSheet::from).collect())
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    /// Returns once the navigation commits. Load progress is polled by the
    /// readiness waits below.
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        let response = self.page.execute(NavigateParams::new(url)).await?;
        match &response.result.error_text {
            Some(error) => Err(DriverError::Navigation(error.clone())),
            None => Ok(()),
        }
    }

    async fn wait_for_network_idle(&self) -> Result<(), DriverError> {
        let mut window = QuietWindow::new(Instant::now());
        loop {
            let count: u64 = self.eval(RESOURCE_COUNT_SCRIPT).await?;
            if window.observe(count, Instant::now()) {
                debug!(resources = count, "network idle");
                return Ok(());
            }
            sleep(READINESS_POLL_INTERVAL).await;
        }
    }

    async fn wait_for_load(&self) -> Result<(), DriverError> {
        while !self.eval::<bool>(LOAD_SCRIPT).await? {
            sleep(READINESS_POLL_INTERVAL).await;
        }
        Ok(())
    }

    async fn click_overlay(&self, target: &OverlayTarget) -> Result<bool, DriverError> {
        self.eval(&overlay_click_script(target)).await
    }

    async fn document_height(&self) -> Result<u64, DriverError> {
        self.eval(DOCUMENT_HEIGHT_SCRIPT).await
    }

    async fn viewport_height(&self) -> Result<u64, DriverError> {
        self.eval("window.innerHeight").await
    }

    async fn scroll_to(&self, y: u64) -> Result<(), DriverError> {
        self.eval::<bool>(&format!("window.scrollTo(0, {y}), true"))
            .await
            .map(drop)
    }

    async fn wait_for_images(&self) -> Result<(), DriverError> {
        self.eval::<bool>(IMAGES_SCRIPT).await.map(drop)
    }

    async fn wait_for_fonts(&self) -> Result<(), DriverError> {
        self.eval::<bool>("document.fonts.ready.then(() => true)")
            .await
            .map(drop)
    }

    async fn content(&self) -> Result<String, DriverError> {
        Ok(self.page.content().await?)
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, DriverError> {
        let params = ScreenshotParams::builder().full_page(full_page).build();
        Ok(self.page.screenshot(params).await?)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let browser = self.browser.get_mut();
        let result = browser.close().await;
        if let Err(e) = browser.wait().await {
            debug!("waiting for browser exit failed: {e}");
        }
        self.handler.abort();
        info!("browser closed");
        result.map(drop).map_err(DriverError::from)
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_targets_escape_their_needle() {
        let script = overlay_click_script(&OverlayTarget::Text("it's \"ok\""));
        assert!(script.contains(r#""it's \"ok\"""#));
        assert!(script.contains("toLowerCase()"));
    }

    #[test]
    fn button_targets_only_match_buttons() {
        let script = overlay_click_script(&OverlayTarget::ButtonText("Accept"));
        assert!(script.contains(r#"querySelectorAll("button")"#));
    }

    #[test]
    fn css_targets_use_query_selector() {
        let script = overlay_click_script(&OverlayTarget::Css(r#"[id*="accept"]"#));
        assert!(script.contains(r#"querySelector("[id*=\"accept\"]")"#));
        assert!(!script.contains("needle"));
    }

    #[test]
    fn quiet_window_needs_a_stable_count() {
        let start = Instant::now();
        let mut window = QuietWindow::new(start);
        assert!(!window.observe(3, start));
        assert!(!window.observe(3, start + Duration::from_millis(300)));
        assert!(window.observe(3, start + Duration::from_millis(500)));
    }

    #[test]
    fn new_resources_restart_the_quiet_window() {
        let start = Instant::now();
        let mut window = QuietWindow::new(start);
        window.observe(10, start);
        assert!(!window.observe(11, start + Duration::from_millis(450)));
        assert!(!window.observe(11, start + Duration::from_millis(900)));
        assert!(window.observe(11, start + Duration::from_millis(950)));
    }

    #[test]
    fn resource_counter_is_not_capped_by_timing_buffer() {
        assert!(RESOURCE_COUNT_SCRIPT.contains("PerformanceObserver"));
        assert!(RESOURCE_COUNT_SCRIPT.contains("setResourceTimingBufferSize"));
    }

    #[test]
    fn raw_sheet_error_becomes_err() {
        let raw: Vec<RawFontFaceSheet> = serde_json::from_str(
            r#"[{"href": "https://cdn/x.css", "error": "SecurityError"},
                {"href": null, "sources": ["url(a.woff2)"]}]"#,
        )
        .unwrap();
        let sheets: Vec<FontFaceSheet> = raw.into_iter().map(FontFaceSheet::from).collect();
        assert_eq!(sheets[0].sources, Err("SecurityError".to_string()));
        assert_eq!(sheets[1].sources, Ok(vec!["url(a.woff2)".to_string()]));
        assert_eq!(sheets[1].href, None);
    }
}

// Scripted page driver shared by the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;
use url::Url;

use site_cloner::config::ClonerConfig;
use site_cloner::discover::{DomQuery, FontFaceSheet};
use site_cloner::error::DriverError;
use site_cloner::page::{OverlayTarget, PageDriver};
use site_cloner::snapshot::SnapshotDom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Ok,
    /// Commits after the given delay.
    Slow(Duration),
    Fail,
    Hang,
}

/// A page whose DOM is a fixed HTML document and whose layout is scripted.
pub struct FakePage {
    dom: SnapshotDom,
    navigation: Navigation,
    viewport_height: u64,
    document_height: u64,
    /// `(after_scrolls, new_height)`: the document grows once this many
    /// scrolls have happened.
    growth: Option<(usize, u64)>,
    clickable: Option<OverlayTarget>,
    failing_click: Option<OverlayTarget>,
    broken_scripts_query: bool,
    broken_backgrounds_query: bool,
    pub scrolls: Mutex<Vec<u64>>,
    pub click_attempts: Mutex<Vec<OverlayTarget>>,
    pub close_calls: AtomicUsize,
}

impl FakePage {
    pub fn new(html: &str, url: &str) -> Self {
        Self {
            dom: SnapshotDom::new(html, Url::parse(url).unwrap()),
            navigation: Navigation::Ok,
            viewport_height: 1080,
            document_height: 1080,
            growth: None,
            clickable: None,
            failing_click: None,
            broken_scripts_query: false,
            broken_backgrounds_query: false,
            scrolls: Mutex::new(Vec::new()),
            click_attempts: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn navigation(mut self, navigation: Navigation) -> Self {
        self.navigation = navigation;
        self
    }

    pub fn heights(mut self, viewport: u64, document: u64) -> Self {
        self.viewport_height = viewport;
        self.document_height = document;
        self
    }

    pub fn grows_after(mut self, scrolls: usize, height: u64) -> Self {
        self.growth = Some((scrolls, height));
        self
    }

    pub fn clickable(mut self, target: OverlayTarget) -> Self {
        self.clickable = Some(target);
        self
    }

    pub fn failing_click(mut self, target: OverlayTarget) -> Self {
        self.failing_click = Some(target);
        self
    }

    pub fn broken_scripts_query(mut self) -> Self {
        self.broken_scripts_query = true;
        self
    }

    pub fn broken_backgrounds_query(mut self) -> Self {
        self.broken_backgrounds_query = true;
        self
    }

    pub fn scroll_positions(&self) -> Vec<u64> {
        self.scrolls.lock().unwrap().clone()
    }

    pub fn closed(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DomQuery for FakePage {
    async fn stylesheet_links(&self) -> Result<Vec<String>, DriverError> {
        self.dom.stylesheet_links().await
    }

    async fn script_sources(&self) -> Result<Vec<String>, DriverError> {
        if self.broken_scripts_query {
            return Err(DriverError::Evaluation("execution context destroyed".into()));
        }
        self.dom.script_sources().await
    }

    async fn image_sources(&self) -> Result<Vec<String>, DriverError> {
        self.dom.image_sources().await
    }

    async fn background_images(&self) -> Result<Vec<String>, DriverError> {
        if self.broken_backgrounds_query {
            return Err(DriverError::Evaluation("getComputedStyle failed".into()));
        }
        self.dom.background_images().await
    }

    async fn svg_objects(&self) -> Result<Vec<String>, DriverError> {
        self.dom.svg_objects().await
    }

    async fn font_faces(&self) -> Result<Vec<FontFaceSheet>, DriverError> {
        self.dom.font_faces().await
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, _url: &str) -> Result<(), DriverError> {
        match self.navigation {
            Navigation::Ok => Ok(()),
            Navigation::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Navigation::Fail => Err(DriverError::Navigation(
                "net::ERR_NAME_NOT_RESOLVED".into(),
            )),
            Navigation::Hang => std::future::pending().await,
        }
    }

    async fn wait_for_network_idle(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn wait_for_load(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn click_overlay(&self, target: &OverlayTarget) -> Result<bool, DriverError> {
        self.click_attempts.lock().unwrap().push(*target);
        if self.failing_click == Some(*target) {
            return Err(DriverError::Evaluation("detached node".into()));
        }
        Ok(self.clickable == Some(*target))
    }

    async fn document_height(&self) -> Result<u64, DriverError> {
        let scrolled = self.scrolls.lock().unwrap().len();
        Ok(match self.growth {
            Some((after, height)) if scrolled >= after => height,
            _ => self.document_height,
        })
    }

    async fn viewport_height(&self) -> Result<u64, DriverError> {
        Ok(self.viewport_height)
    }

    async fn scroll_to(&self, y: u64) -> Result<(), DriverError> {
        self.scrolls.lock().unwrap().push(y);
        Ok(())
    }

    async fn wait_for_images(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn wait_for_fonts(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn content(&self) -> Result<String, DriverError> {
        Ok(self.dom.html().to_string())
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, DriverError> {
        let marker: &[u8] = if full_page { b"full" } else { b"view" };
        Ok([b"\x89PNG".as_slice(), marker].concat())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Defaults with no pauses and short timeouts.
pub fn fast_config() -> ClonerConfig {
    let mut config = ClonerConfig::default().without_delays();
    config.overlay_attempt_timeout_ms = 20;
    config.navigation_timeout_secs = 1;
    config.fetch_timeout_secs = 5;
    config
}

/// Serve `app` on an ephemeral local port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

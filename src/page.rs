//! Drives a single page to a stable, fully rendered state and captures it.
//!
//! [`PageDriver`] is the browser seam; [`PageController`] owns the sequencing,
//! the timing and the failure policy. Only navigation can fail a run. Every
//! stabilization step logs its failure and moves on.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ClonerConfig;
use crate::discover::DomQuery;
use crate::error::{CloneError, DriverError};

const OVERLAY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Something to click to get a consent or cookie banner out of the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayTarget {
    /// A clickable element whose text contains this, ignoring case.
    Text(&'static str),
    /// A `<button>` whose text contains this, ignoring case.
    ButtonText(&'static str),
    /// The first element matching a CSS selector.
    Css(&'static str),
}

/// Banner targets, tried in this order until one click lands.
pub const COOKIE_BANNER_TARGETS: &[OverlayTarget] = &[
    OverlayTarget::Text("accept all"),
    OverlayTarget::Text("accept"),
    OverlayTarget::ButtonText("Accept"),
    OverlayTarget::ButtonText("Accept All"),
    OverlayTarget::Css(r#"[class*="accept"]"#),
    OverlayTarget::Css(r#"[id*="accept"]"#),
];

/// Browser operations the controller needs. One page, used sequentially.
#[async_trait]
pub trait PageDriver: DomQuery {
    /// Start loading `url` and wait for the navigation to commit.
    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    async fn wait_for_network_idle(&self) -> Result<(), DriverError>;

    /// Wait for the `DOMContentLoaded` and `load` milestones.
    async fn wait_for_load(&self) -> Result<(), DriverError>;

    /// One click attempt. `Ok(false)` when nothing matched.
    async fn click_overlay(&self, target: &OverlayTarget) -> Result<bool, DriverError>;

    /// Current `document.body.scrollHeight`.
    async fn document_height(&self) -> Result<u64, DriverError>;

    /// Current `window.innerHeight`.
    async fn viewport_height(&self) -> Result<u64, DriverError>;

    async fn scroll_to(&self, y: u64) -> Result<(), DriverError>;

    /// Resolve once every incomplete `<img>` has loaded or errored.
    async fn wait_for_images(&self) -> Result<(), DriverError>;

    /// Resolve once `document.fonts.ready` does.
    async fn wait_for_fonts(&self) -> Result<(), DriverError>;

    /// Serialized live DOM.
    async fn content(&self) -> Result<String, DriverError>;

    /// PNG of the whole scrollable document or only the viewport.
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, DriverError>;

    /// Release the page and its browser process.
    async fn close(&mut self) -> Result<(), DriverError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Idle,
    Navigating,
    Stabilizing,
    Ready,
    Capturing,
    Done,
    Failed,
}

/// Full-page and viewport PNGs.
#[derive(Debug, Clone)]
pub struct Screenshots {
    pub full_page: Vec<u8>,
    pub viewport: Vec<u8>,
}

pub struct PageController<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    config: &'a ClonerConfig,
    state: PageState,
}

impl<'a, D: PageDriver + ?Sized> PageController<'a, D> {
    pub fn new(driver: &'a D, config: &'a ClonerConfig) -> Self {
        Self {
            driver,
            config,
            state: PageState::Idle,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn driver(&self) -> &'a D {
        self.driver
    }

    fn transition(&mut self, next: PageState) {
        debug!(from = ?self.state, to = ?next, "page state");
        self.state = next;
    }

    /// Load `url` under the navigation timeout, then let the page settle.
    ///
    /// The only fallible step: a timeout or driver error here ends the run.
    pub async fn navigate(&mut self, url: &Url) -> Result<(), CloneError> {
        self.transition(PageState::Navigating);
        info!(%url, "navigating");

        let limit = self.config.navigation_timeout();
        let driver = self.driver;
        let load = async {
            driver.goto(url.as_str()).await?;
            driver.wait_for_network_idle().await?;
            driver.wait_for_load().await
        };

        let outcome = match timeout(limit, load).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout(limit)),
        };
        if let Err(source) = outcome {
            self.transition(PageState::Failed);
            return Err(CloneError::Navigation {
                url: url.to_string(),
                source,
            });
        }

        info!("initial page load complete");
        sleep(self.config.settle_delay()).await;
        self.transition(PageState::Stabilizing);
        Ok(())
    }

    /// Dismiss banners, walk the page for lazy content and wait for media.
    pub async fn stabilize(&mut self) {
        if self.state != PageState::Stabilizing {
            self.transition(PageState::Stabilizing);
        }
        self.dismiss_overlays().await;
        sleep(self.config.post_overlay_delay()).await;
        self.trigger_lazy_content().await;
        self.await_media_ready().await;
        self.transition(PageState::Ready);
        info!("page stabilized");
    }

    /// Try each banner target for a short while and stop at the first click.
    /// Returns the target that worked, if any. Never fails.
    pub async fn dismiss_overlays(&self) -> Option<OverlayTarget> {
        for target in COOKIE_BANNER_TARGETS {
            match self.try_overlay(target).await {
                Ok(()) => {
                    info!(?target, "closed cookie popup");
                    sleep(self.config.overlay_click_delay()).await;
                    return Some(*target);
                }
                Err(reason) => debug!(?target, %reason, "overlay target missed"),
            }
        }
        None
    }

    async fn try_overlay(&self, target: &OverlayTarget) -> Result<(), DriverError> {
        let limit = self.config.overlay_attempt_timeout();
        let attempt = async {
            loop {
                if self.driver.click_overlay(target).await? {
                    return Ok::<(), DriverError>(());
                }
                sleep(OVERLAY_POLL_INTERVAL).await;
            }
        };
        timeout(limit, attempt)
            .await
            .unwrap_or(Err(DriverError::Timeout(limit)))
    }

    /// Scroll down one viewport at a time until the bottom is reached, then
    /// return to the top. The document height is re-read after every step
    /// since scrolling can load more content. Returns the number of steps.
    pub async fn trigger_lazy_content(&self) -> u32 {
        info!("scrolling through page to load lazy content");

        let step = match self.driver.viewport_height().await {
            Ok(height) if height > 0 => height,
            Ok(_) => u64::from(self.config.viewport_height),
            Err(e) => {
                warn!(error = %e, "could not read viewport height");
                u64::from(self.config.viewport_height)
            }
        };
        let mut total = match self.driver.document_height().await {
            Ok(height) => height,
            Err(e) => {
                warn!(error = %e, "could not read document height, skipping scroll");
                return 0;
            }
        };

        let mut position = 0;
        let mut steps = 0;
        while position < total {
            if steps >= self.config.max_scroll_steps {
                warn!(steps, total, "scroll step limit reached");
                break;
            }
            if let Err(e) = self.driver.scroll_to(position).await {
                warn!(position, error = %e, "scroll failed");
                break;
            }
            steps += 1;
            sleep(self.config.scroll_pause()).await;
            position += step;

            match self.driver.document_height().await {
                Ok(height) => total = height,
                Err(e) => {
                    warn!(error = %e, "could not re-read document height");
                    break;
                }
            }
        }

        if let Err(e) = self.driver.scroll_to(0).await {
            warn!(error = %e, "could not scroll back to top");
        }
        sleep(self.config.scroll_return_pause()).await;
        debug!(steps, total, "finished scrolling through page");
        steps
    }

    /// Wait for pending images and fonts, then give late content a grace period.
    pub async fn await_media_ready(&self) {
        info!("waiting for images and fonts to load");
        let limit = self.config.navigation_timeout();

        match timeout(limit, self.driver.wait_for_images()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "image readiness check failed"),
            Err(_) => warn!(?limit, "images still loading"),
        }
        match timeout(limit, self.driver.wait_for_fonts()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "font readiness check failed"),
            Err(_) => warn!(?limit, "fonts still loading"),
        }

        sleep(self.config.media_grace()).await;
    }

    pub async fn html(&self) -> Result<String, CloneError> {
        self.driver.content().await.map_err(CloneError::PageContent)
    }

    pub async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, CloneError> {
        self.driver
            .screenshot(full_page)
            .await
            .map_err(CloneError::Screenshot)
    }

    /// Full-page capture first, then the viewport.
    pub async fn capture(&mut self) -> Result<Screenshots, CloneError> {
        self.transition(PageState::Capturing);
        let full_page = self.screenshot(true).await?;
        let viewport = self.screenshot(false).await?;
        self.transition(PageState::Done);
        Ok(Screenshots {
            full_page,
            viewport,
        })
    }
}

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CloneError;

/// Desktop Chrome user agent presented by both the browser and the asset fetcher.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Configuration for a clone run.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, Deserialize)]
pub struct ClonerConfig {
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
    /// Pause after the load milestones for client-side frameworks to mount.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_overlay_attempt_timeout_ms")]
    pub overlay_attempt_timeout_ms: u64,
    #[serde(default = "default_overlay_click_delay_ms")]
    pub overlay_click_delay_ms: u64,
    #[serde(default = "default_post_overlay_delay_ms")]
    pub post_overlay_delay_ms: u64,
    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,
    #[serde(default = "default_scroll_return_pause_ms")]
    pub scroll_return_pause_ms: u64,
    /// Upper bound on scroll steps for pages that grow forever.
    #[serde(default = "default_max_scroll_steps")]
    pub max_scroll_steps: u32,
    #[serde(default = "default_media_grace_ms")]
    pub media_grace_ms: u64,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_viewport_width() -> u32 { 1920 }
fn default_viewport_height() -> u32 { 1080 }
fn default_user_agent() -> String { DEFAULT_USER_AGENT.to_string() }
fn default_navigation_timeout_secs() -> u64 { 60 }
fn default_settle_delay_ms() -> u64 { 3000 }
fn default_overlay_attempt_timeout_ms() -> u64 { 1000 }
fn default_overlay_click_delay_ms() -> u64 { 1000 }
fn default_post_overlay_delay_ms() -> u64 { 2000 }
fn default_scroll_pause_ms() -> u64 { 500 }
fn default_scroll_return_pause_ms() -> u64 { 1000 }
fn default_max_scroll_steps() -> u32 { 1000 }
fn default_media_grace_ms() -> u64 { 2000 }
fn default_fetch_timeout_secs() -> u64 { 30 }
fn default_max_concurrent_downloads() -> usize { 8 }

impl Default for ClonerConfig {
    fn default() -> Self {
        Self {
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            user_agent: default_user_agent(),
            headless: false,
            chrome_path: None,
            navigation_timeout_secs: default_navigation_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            overlay_attempt_timeout_ms: default_overlay_attempt_timeout_ms(),
            overlay_click_delay_ms: default_overlay_click_delay_ms(),
            post_overlay_delay_ms: default_post_overlay_delay_ms(),
            scroll_pause_ms: default_scroll_pause_ms(),
            scroll_return_pause_ms: default_scroll_return_pause_ms(),
            max_scroll_steps: default_max_scroll_steps(),
            media_grace_ms: default_media_grace_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            accept_invalid_certs: false,
        }
    }
}

impl ClonerConfig {
    /// Load a config file. Missing keys fall back to their defaults.
    pub fn load(path: &Path) -> Result<Self, CloneError> {
        let content = fs::read_to_string(path).map_err(|source| CloneError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| CloneError::ConfigFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `<config_dir>/site-cloner/config.json` when it exists, defaults otherwise.
    pub fn load_default() -> Result<Self, CloneError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("site-cloner").join("config.json"))
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn overlay_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.overlay_attempt_timeout_ms)
    }

    pub fn overlay_click_delay(&self) -> Duration {
        Duration::from_millis(self.overlay_click_delay_ms)
    }

    pub fn post_overlay_delay(&self) -> Duration {
        Duration::from_millis(self.post_overlay_delay_ms)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn scroll_return_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_return_pause_ms)
    }

    pub fn media_grace(&self) -> Duration {
        Duration::from_millis(self.media_grace_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Same config with every pause set to zero. Timeouts are kept.
    pub fn without_delays(mut self) -> Self {
        self.settle_delay_ms = 0;
        self.overlay_click_delay_ms = 0;
        self.post_overlay_delay_ms = 0;
        self.scroll_pause_ms = 0;
        self.scroll_return_pause_ms = 0;
        self.media_grace_ms = 0;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: ClonerConfig =
            serde_json::from_str(r#"{ "headless": true, "max_concurrent_downloads": 2 }"#).unwrap();
        assert!(config.headless);
        assert_eq!(config.max_concurrent_downloads, 2);
        assert_eq!(config.viewport_width, 1920);
        assert_eq!(config.viewport_height, 1080);
        assert_eq!(config.navigation_timeout(), Duration::from_secs(60));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn default_is_headed() {
        let config = ClonerConfig::default();
        assert!(!config.headless);
        assert_eq!(config.scroll_pause(), Duration::from_millis(500));
    }

    #[test]
    fn load_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let err = ClonerConfig::load(&path).unwrap_err();
        assert!(matches!(err, CloneError::ConfigFormat { .. }));
    }

    #[test]
    fn without_delays_keeps_timeouts() {
        let config = ClonerConfig::default().without_delays();
        assert_eq!(config.settle_delay(), Duration::ZERO);
        assert_eq!(config.media_grace(), Duration::ZERO);
        assert_eq!(config.navigation_timeout(), Duration::from_secs(60));
    }
}

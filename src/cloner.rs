//! Clone orchestrator.
//!
//! Sequences one run: scaffold, navigate and stabilize, discover, download,
//! save HTML, screenshots, manifest. Navigation is the failure boundary:
//! past it, assets and stylesheets fail one at a time and the run goes on.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info};
use url::Url;

use crate::browser::ChromeDriver;
use crate::config::ClonerConfig;
use crate::discover::Discoverer;
use crate::download::{download_all, AssetOutcome, DownloadReport};
use crate::error::CloneError;
use crate::fetcher::Fetcher;
use crate::output::{Manifest, OutputLayout, ScreenshotKind};
use crate::page::{PageController, PageDriver};

/// Prefix `https://` unless the input already names an http(s) scheme.
pub fn normalize_url(input: &str) -> String {
    let input = input.trim();
    if input.starts_with("http") {
        input.to_string()
    } else {
        format!("https://{input}")
    }
}

/// `cloned_{domain}` with `.` and `:` replaced by `_`.
pub fn default_output_dir(domain: &str) -> PathBuf {
    PathBuf::from(format!("cloned_{}", domain.replace(['.', ':'], "_")))
}

/// The page being cloned and where it goes. Fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneTarget {
    url: Url,
    domain: String,
    output_root: PathBuf,
}

impl CloneTarget {
    /// Target with the output directory derived from the domain.
    pub fn parse(input: &str) -> Result<Self, CloneError> {
        let (url, domain) = Self::parse_url(input)?;
        let output_root = default_output_dir(&domain);
        Ok(Self {
            url,
            domain,
            output_root,
        })
    }

    pub fn with_output_root(input: &str, output_root: impl Into<PathBuf>) -> Result<Self, CloneError> {
        let (url, domain) = Self::parse_url(input)?;
        Ok(Self {
            url,
            domain,
            output_root: output_root.into(),
        })
    }

    fn parse_url(input: &str) -> Result<(Url, String), CloneError> {
        let normalized = normalize_url(input);
        let url = Url::parse(&normalized).map_err(|source| CloneError::InvalidUrl {
            input: input.to_string(),
            source,
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| CloneError::MissingHost(normalized.clone()))?;
        let domain = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok((url, domain))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEvent {
    Scaffold,
    Navigating,
    Stabilizing,
    Discovered,
    AssetSaved,
    AssetFailed,
    HtmlSaved,
    ScreenshotSaved,
    Complete,
}

/// Progress event for a clone run.
#[derive(Debug, Clone, Serialize)]
pub struct CloneProgress {
    pub event: ProgressEvent,
    pub message: String,
    pub assets_done: usize,
    pub assets_total: usize,
    pub current_url: Option<String>,
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct CloneReport {
    pub target: CloneTarget,
    /// The discovered set, as written to `metadata.json`.
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    pub html_path: PathBuf,
    pub screenshots: Vec<PathBuf>,
    pub downloads: DownloadReport,
    pub elapsed: Duration,
}

pub struct Cloner {
    target: CloneTarget,
    config: ClonerConfig,
    fetcher: Fetcher,
}

impl Cloner {
    pub fn new(target: CloneTarget, config: ClonerConfig) -> Result<Self, CloneError> {
        let fetcher = Fetcher::new(&config)?;
        Ok(Self {
            target,
            config,
            fetcher,
        })
    }

    pub fn target(&self) -> &CloneTarget {
        &self.target
    }

    pub fn config(&self) -> &ClonerConfig {
        &self.config
    }

    /// Clone with a freshly launched browser.
    pub async fn clone_site(&self) -> Result<CloneReport, CloneError> {
        self.clone_site_with_callback(|_| {}).await
    }

    pub async fn clone_site_with_callback<F>(&self, on_progress: F) -> Result<CloneReport, CloneError>
    where
        F: Fn(CloneProgress) + Send + Sync,
    {
        let mut driver = ChromeDriver::launch(&self.config)
            .await
            .map_err(CloneError::BrowserLaunch)?;
        self.clone_with_driver(&mut driver, on_progress).await
    }

    /// Run the pipeline on an already open page. The driver is closed on
    /// every exit path.
    pub async fn clone_with_driver<D, F>(
        &self,
        driver: &mut D,
        on_progress: F,
    ) -> Result<CloneReport, CloneError>
    where
        D: PageDriver + ?Sized,
        F: Fn(CloneProgress) + Send + Sync,
    {
        let result = self.pipeline(&*driver, &on_progress).await;
        if let Err(e) = driver.close().await {
            error!(error = %e, "failed to close browser");
        }
        result
    }

    async fn pipeline<D, F>(&self, driver: &D, on_progress: &F) -> Result<CloneReport, CloneError>
    where
        D: PageDriver + ?Sized,
        F: Fn(CloneProgress) + Send + Sync,
    {
        let started = Instant::now();
        let url = self.target.url();
        let emit = |event, message: String, done, total| {
            on_progress(CloneProgress {
                event,
                message,
                assets_done: done,
                assets_total: total,
                current_url: None,
            })
        };

        info!(%url, root = %self.target.output_root().display(), "starting web clone");
        let output = OutputLayout::new(self.target.output_root());
        output.scaffold().await?;
        emit(
            ProgressEvent::Scaffold,
            format!("Created directory structure in {}", output.root().display()),
            0,
            0,
        );

        let mut page = PageController::new(driver, &self.config);
        emit(ProgressEvent::Navigating, format!("Navigating to {url}"), 0, 0);
        if let Err(e) = page.navigate(url).await {
            error!(%url, error = %e, "navigation failed, aborting");
            return Err(e);
        }

        emit(ProgressEvent::Stabilizing, "Stabilizing page".to_string(), 0, 0);
        page.stabilize().await;

        let registry = Discoverer::new(url).discover(driver).await;
        let total = registry.total();
        emit(
            ProgressEvent::Discovered,
            format!("Found {total} assets"),
            0,
            total,
        );

        let done = AtomicUsize::new(0);
        let downloads = download_all(
            &registry,
            &self.fetcher,
            &output,
            self.config.max_concurrent_downloads,
            |outcome| {
                let assets_done = done.fetch_add(1, Ordering::Relaxed) + 1;
                let (event, message) = match outcome {
                    AssetOutcome::Saved { category, path, .. } => (
                        ProgressEvent::AssetSaved,
                        format!("Downloaded {category}: {}", file_name(path)),
                    ),
                    AssetOutcome::Failed { url, reason, .. } => (
                        ProgressEvent::AssetFailed,
                        format!("Error downloading {url}: {reason}"),
                    ),
                };
                on_progress(CloneProgress {
                    event,
                    message,
                    assets_done,
                    assets_total: total,
                    current_url: Some(outcome.url().to_string()),
                });
            },
        )
        .await;
        let done = downloads.total_saved() + downloads.failed.len();

        let html = page.html().await?;
        let html_path = output.write_html(&html).await?;
        emit(
            ProgressEvent::HtmlSaved,
            format!("Saved HTML to {}", html_path.display()),
            done,
            total,
        );

        let shots = page.capture().await?;
        let mut screenshots = Vec::with_capacity(2);
        for (kind, png) in [
            (ScreenshotKind::FullPage, &shots.full_page),
            (ScreenshotKind::Viewport, &shots.viewport),
        ] {
            let path = output.write_screenshot(kind, png).await?;
            emit(
                ProgressEvent::ScreenshotSaved,
                format!("Saved screenshot {}", path.display()),
                done,
                total,
            );
            screenshots.push(path);
        }

        let manifest = Manifest::new(url.as_str(), self.target.domain(), &registry);
        let manifest_path = output.write_manifest(&manifest).await?;
        drop(registry);

        let elapsed = started.elapsed();
        info!(root = %output.root().display(), ?elapsed, "web clone completed");
        emit(
            ProgressEvent::Complete,
            format!("Web cloning completed! All files saved to: {}", output.root().display()),
            done,
            total,
        );

        Ok(CloneReport {
            target: self.target.clone(),
            manifest,
            manifest_path,
            html_path,
            screenshots,
            downloads,
            elapsed,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_defaults_to_https() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url(" http://example.com "), "http://example.com");
        assert_eq!(normalize_url("https://example.com/a"), "https://example.com/a");
    }

    #[test]
    fn output_root_is_derived_from_domain() {
        let target = CloneTarget::parse("www.example.co.uk/path").unwrap();
        assert_eq!(target.domain(), "www.example.co.uk");
        assert_eq!(target.output_root(), Path::new("cloned_www_example_co_uk"));
        assert_eq!(target.url().as_str(), "https://www.example.co.uk/path");
    }

    #[test]
    fn port_is_part_of_domain() {
        let target = CloneTarget::parse("http://127.0.0.1:8080/").unwrap();
        assert_eq!(target.domain(), "127.0.0.1:8080");
        assert_eq!(target.output_root(), Path::new("cloned_127_0_0_1_8080"));
    }

    #[test]
    fn explicit_root_wins() {
        let target = CloneTarget::with_output_root("example.com", "/tmp/out").unwrap();
        assert_eq!(target.output_root(), Path::new("/tmp/out"));
    }

    #[test]
    fn invalid_input_is_rejected() {
        assert!(matches!(
            CloneTarget::parse("http://exa mple.com"),
            Err(CloneError::InvalidUrl { .. })
        ));
    }
}

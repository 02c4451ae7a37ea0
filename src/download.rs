//! Drains an [`AssetRegistry`] into the output directory.
//!
//! Every `(category, index, url)` is an independent job; jobs run with a
//! bounded number in flight. A failed job leaves no file behind and does not
//! affect the others.

use std::collections::HashMap;
use std::path::PathBuf;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::fetcher::Fetcher;
use crate::output::OutputLayout;
use crate::registry::{AssetCategory, AssetRegistry};

/// Result of one asset job.
#[derive(Debug, Clone)]
pub enum AssetOutcome {
    Saved {
        category: AssetCategory,
        url: String,
        path: PathBuf,
        bytes: u64,
    },
    Failed {
        category: AssetCategory,
        url: String,
        reason: String,
    },
}

impl AssetOutcome {
    pub fn category(&self) -> AssetCategory {
        match self {
            AssetOutcome::Saved { category, .. } | AssetOutcome::Failed { category, .. } => {
                *category
            }
        }
    }

    pub fn url(&self) -> &str {
        match self {
            AssetOutcome::Saved { url, .. } | AssetOutcome::Failed { url, .. } => url,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, AssetOutcome::Saved { .. })
    }
}

/// A URL that did not make it to disk, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAsset {
    pub category: AssetCategory,
    pub url: String,
    pub reason: String,
}

/// Totals over every asset job of a run.
#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    pub saved: HashMap<AssetCategory, usize>,
    pub failed: Vec<FailedAsset>,
    pub bytes_written: u64,
}

impl DownloadReport {
    pub fn saved(&self, category: AssetCategory) -> usize {
        self.saved.get(&category).copied().unwrap_or(0)
    }

    pub fn total_saved(&self) -> usize {
        self.saved.values().sum()
    }

    fn record(&mut self, outcome: AssetOutcome) {
        match outcome {
            AssetOutcome::Saved {
                category, bytes, ..
            } => {
                *self.saved.entry(category).or_insert(0) += 1;
                self.bytes_written += bytes;
            }
            AssetOutcome::Failed {
                category,
                url,
                reason,
            } => self.failed.push(FailedAsset {
                category,
                url,
                reason,
            }),
        }
    }
}

/// Fetch and write every registry entry, at most `concurrency` at a time.
/// `on_outcome` sees each job as it finishes.
pub async fn download_all<F>(
    registry: &AssetRegistry,
    fetcher: &Fetcher,
    output: &OutputLayout,
    concurrency: usize,
    on_outcome: F,
) -> DownloadReport
where
    F: Fn(&AssetOutcome),
{
    info!(assets = registry.total(), concurrency, "downloading assets");

    let mut outcomes = stream::iter(registry.iter())
        .map(|(category, index, url)| download_one(fetcher, output, category, index, url))
        .buffer_unordered(concurrency.max(1));

    let mut report = DownloadReport::default();
    while let Some(outcome) = outcomes.next().await {
        on_outcome(&outcome);
        report.record(outcome);
    }

    info!(
        saved = report.total_saved(),
        failed = report.failed.len(),
        bytes = report.bytes_written,
        "asset downloads finished"
    );
    report
}

async fn download_one(
    fetcher: &Fetcher,
    output: &OutputLayout,
    category: AssetCategory,
    index: usize,
    url: &str,
) -> AssetOutcome {
    let failed = |reason: String| AssetOutcome::Failed {
        category,
        url: url.to_string(),
        reason,
    };

    let body = match fetcher.fetch(url).await {
        Ok(body) => body,
        Err(failure) => return failed(failure.cause.to_string()),
    };

    let path = output.asset_path(category, index, url);
    if let Err(e) = output.write_asset(&path, &body).await {
        warn!(url, error = %e, "could not save asset");
        return failed(e.to_string());
    }

    debug!(%category, url, path = %path.display(), "saved asset");
    AssetOutcome::Saved {
        category,
        url: url.to_string(),
        path,
        bytes: body.len() as u64,
    }
}

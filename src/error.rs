//! Error types for the cloning pipeline.
//!
//! Only [`CloneError`] ends a run. Everything raised after navigation is
//! reported through [`FetchFailure`] or logged and skipped.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Fatal errors that abort a clone run.
#[derive(Debug, Error)]
pub enum CloneError {
    #[error("invalid URL {input:?}")]
    InvalidUrl {
        input: String,
        #[source]
        source: url::ParseError,
    },

    #[error("URL {0} has no host")]
    MissingHost(String),

    #[error("failed to create HTTP client")]
    HttpClient(#[source] reqwest::Error),

    #[error("failed to launch browser")]
    BrowserLaunch(#[source] DriverError),

    #[error("navigation to {url} failed")]
    Navigation {
        url: String,
        #[source]
        source: DriverError,
    },

    #[error("failed to read page content")]
    PageContent(#[source] DriverError),

    #[error("screenshot capture failed")]
    Screenshot(#[source] DriverError),

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize manifest")]
    Manifest(#[from] serde_json::Error),

    #[error("failed to read config {}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}", path.display())]
    ConfigFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CloneError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CloneError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures of the browser session itself.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("devtools protocol error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation rejected: {0}")]
    Navigation(String),

    #[error("page evaluation failed: {0}")]
    Evaluation(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<serde_json::Error> for DriverError {
    fn from(e: serde_json::Error) -> Self {
        DriverError::Evaluation(format!("unexpected result shape: {e}"))
    }
}

/// Why a single asset could not be retrieved.
#[derive(Debug, Error)]
pub enum FetchCause {
    #[error("HTTP {0}")]
    Status(StatusCode),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// A failed asset fetch. Logged and recorded, never propagated.
#[derive(Debug, Error)]
#[error("failed to fetch {url}: {cause}")]
pub struct FetchFailure {
    pub url: String,
    #[source]
    pub cause: FetchCause,
}

impl FetchFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(&self.cause, FetchCause::Transport(e) if e.is_timeout())
    }
}

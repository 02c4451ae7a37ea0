//! Offline snapshots of rendered web pages.
//!
//! A run renders one page in a real browser, forces lazy content to load,
//! collects every stylesheet, script, image, font and SVG it references,
//! downloads them concurrently and writes the DOM, screenshots and a
//! `metadata.json` manifest into one directory.

pub mod browser;
pub mod cloner;
pub mod config;
pub mod discover;
pub mod download;
pub mod error;
pub mod fetcher;
pub mod output;
pub mod page;
pub mod registry;
pub mod snapshot;

pub use cloner::{CloneProgress, CloneReport, CloneTarget, Cloner, ProgressEvent};
pub use config::ClonerConfig;
pub use error::{CloneError, DriverError, FetchFailure};
pub use output::Manifest;
pub use registry::{AssetCategory, AssetRegistry};

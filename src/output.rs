//! On-disk layout of a clone.
//!
//! ```text
//! {root}/index.html
//! {root}/metadata.json
//! {root}/css/style_N.css      {root}/js/script_N.js
//! {root}/images/image_N.ext   {root}/svgs/svg_N.svg
//! {root}/fonts/font_N.ext     {root}/screenshots/{fullpage,viewport}.png
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;
use url::Url;

use crate::error::CloneError;
use crate::registry::{AssetCategory, AssetRegistry};

pub const HTML_FILE: &str = "index.html";
pub const MANIFEST_FILE: &str = "metadata.json";
pub const SCREENSHOTS_DIR: &str = "screenshots";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenshotKind {
    FullPage,
    Viewport,
}

impl ScreenshotKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            ScreenshotKind::FullPage => "fullpage.png",
            ScreenshotKind::Viewport => "viewport.png",
        }
    }
}

/// Output filename for the `index`-th URL of a category.
///
/// Images and fonts keep the extension of the URL path's last segment
/// (`image_0.png`); everything else, and URLs without one, gets the
/// category default.
pub fn asset_file_name(category: AssetCategory, index: usize, url: &str) -> String {
    let extension = if category.keeps_source_extension() {
        source_extension(url).unwrap_or_else(|| category.default_extension().to_string())
    } else {
        category.default_extension().to_string()
    };
    format!("{}_{}{}", category.file_prefix(), index, extension)
}

/// Suffix of the URL path's last segment, dot included. Unparseable URLs and
/// segments without a suffix yield `None`.
fn source_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let stem_end = segment.rfind('.')?;
    // ".htaccess"-style names have no suffix.
    if stem_end == 0 {
        return None;
    }
    let extension = &segment[stem_end..];
    if extension.len() < 2 || !extension[1..].chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(extension.to_string())
}

/// Per-category counts in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCounts {
    pub css_count: usize,
    pub js_count: usize,
    pub images_count: usize,
    pub fonts_count: usize,
    pub svgs_count: usize,
}

/// Per-category URL lists in the manifest, in filename index order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetUrls {
    pub css: Vec<String>,
    pub js: Vec<String>,
    pub images: Vec<String>,
    pub fonts: Vec<String>,
    pub svgs: Vec<String>,
}

/// `metadata.json`: what discovery found, whether or not it downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub url: String,
    pub domain: String,
    pub assets: AssetCounts,
    pub asset_urls: AssetUrls,
}

impl Manifest {
    pub fn new(url: &str, domain: &str, registry: &AssetRegistry) -> Self {
        let urls = |category| registry.urls(category).to_vec();
        Self {
            url: url.to_string(),
            domain: domain.to_string(),
            assets: AssetCounts {
                css_count: registry.count(AssetCategory::Stylesheet),
                js_count: registry.count(AssetCategory::Script),
                images_count: registry.count(AssetCategory::Image),
                fonts_count: registry.count(AssetCategory::Font),
                svgs_count: registry.count(AssetCategory::VectorGraphic),
            },
            asset_urls: AssetUrls {
                css: urls(AssetCategory::Stylesheet),
                js: urls(AssetCategory::Script),
                images: urls(AssetCategory::Image),
                fonts: urls(AssetCategory::Font),
                svgs: urls(AssetCategory::VectorGraphic),
            },
        }
    }

    pub fn count(&self, category: AssetCategory) -> usize {
        match category {
            AssetCategory::Stylesheet => self.assets.css_count,
            AssetCategory::Script => self.assets.js_count,
            AssetCategory::Image => self.assets.images_count,
            AssetCategory::Font => self.assets.fonts_count,
            AssetCategory::VectorGraphic => self.assets.svgs_count,
        }
    }
}

/// Owns the output directory of one clone run.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn category_dir(&self, category: AssetCategory) -> PathBuf {
        self.root.join(category.directory())
    }

    pub fn asset_path(&self, category: AssetCategory, index: usize, url: &str) -> PathBuf {
        self.category_dir(category)
            .join(asset_file_name(category, index, url))
    }

    pub fn html_path(&self) -> PathBuf {
        self.root.join(HTML_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn screenshot_path(&self, kind: ScreenshotKind) -> PathBuf {
        self.root.join(SCREENSHOTS_DIR).join(kind.file_name())
    }

    /// Create the root, one directory per category and `screenshots`.
    /// Existing directories are fine.
    pub async fn scaffold(&self) -> Result<(), CloneError> {
        let dirs = AssetCategory::ALL
            .iter()
            .map(|category| self.category_dir(*category))
            .chain([self.root.join(SCREENSHOTS_DIR)]);

        for dir in dirs {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| CloneError::io(&dir, e))?;
        }
        info!(root = %self.root.display(), "created directory structure");
        Ok(())
    }

    pub async fn write_asset(&self, path: &Path, content: &[u8]) -> Result<(), CloneError> {
        fs::write(path, content)
            .await
            .map_err(|e| CloneError::io(path, e))
    }

    /// Save the serialized DOM as-is.
    pub async fn write_html(&self, html: &str) -> Result<PathBuf, CloneError> {
        let path = self.html_path();
        fs::write(&path, html)
            .await
            .map_err(|e| CloneError::io(&path, e))?;
        info!(path = %path.display(), "saved HTML");
        Ok(path)
    }

    pub async fn write_screenshot(
        &self,
        kind: ScreenshotKind,
        png: &[u8],
    ) -> Result<PathBuf, CloneError> {
        let path = self.screenshot_path(kind);
        fs::write(&path, png)
            .await
            .map_err(|e| CloneError::io(&path, e))?;
        info!(path = %path.display(), "saved screenshot");
        Ok(path)
    }

    pub async fn write_manifest(&self, manifest: &Manifest) -> Result<PathBuf, CloneError> {
        let path = self.manifest_path();
        let content = serde_json::to_string_pretty(manifest)?;
        fs::write(&path, content)
            .await
            .map_err(|e| CloneError::io(&path, e))?;
        info!(path = %path.display(), "saved metadata");
        Ok(path)
    }
}

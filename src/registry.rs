//! Classified, per-category deduplicated set of discovered asset URLs.

use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetCategory {
    Stylesheet,
    Script,
    Image,
    Font,
    VectorGraphic,
}

impl AssetCategory {
    /// Manifest order.
    pub const ALL: [AssetCategory; 5] = [
        AssetCategory::Stylesheet,
        AssetCategory::Script,
        AssetCategory::Image,
        AssetCategory::Font,
        AssetCategory::VectorGraphic,
    ];

    /// Output subdirectory, also the key used in the manifest.
    pub fn directory(&self) -> &'static str {
        match self {
            AssetCategory::Stylesheet => "css",
            AssetCategory::Script => "js",
            AssetCategory::Image => "images",
            AssetCategory::Font => "fonts",
            AssetCategory::VectorGraphic => "svgs",
        }
    }

    pub fn file_prefix(&self) -> &'static str {
        match self {
            AssetCategory::Stylesheet => "style",
            AssetCategory::Script => "script",
            AssetCategory::Image => "image",
            AssetCategory::Font => "font",
            AssetCategory::VectorGraphic => "svg",
        }
    }

    /// Extension used when the category does not take it from the URL.
    pub fn default_extension(&self) -> &'static str {
        match self {
            AssetCategory::Stylesheet => ".css",
            AssetCategory::Script => ".js",
            AssetCategory::Image => ".jpg",
            AssetCategory::Font => ".woff2",
            AssetCategory::VectorGraphic => ".svg",
        }
    }

    /// Whether the file extension comes from the source URL's path.
    pub fn keeps_source_extension(&self) -> bool {
        matches!(self, AssetCategory::Image | AssetCategory::Font)
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetCategory::Stylesheet => "stylesheet",
            AssetCategory::Script => "script",
            AssetCategory::Image => "image",
            AssetCategory::Font => "font",
            AssetCategory::VectorGraphic => "svg",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
struct CategoryUrls {
    urls: Vec<String>,
    seen: HashSet<String>,
}

impl CategoryUrls {
    fn insert(&mut self, url: &str) -> bool {
        if self.seen.contains(url) {
            return false;
        }
        self.seen.insert(url.to_string());
        self.urls.push(url.to_string());
        true
    }
}

/// Discovered asset URLs keyed by category.
///
/// URLs are unique within a category and kept in first-discovery order, so
/// enumeration indices (and therefore output filenames) are stable for the
/// same page. The same URL may appear under two categories.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    entries: HashMap<AssetCategory, CategoryUrls>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a URL. Returns false if it was already present in that category
    /// or is blank.
    pub fn insert(&mut self, category: AssetCategory, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() {
            return false;
        }
        self.entries.entry(category).or_default().insert(url)
    }

    /// Add every URL, returning how many were new.
    pub fn extend<I, S>(&mut self, category: AssetCategory, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        urls.into_iter()
            .filter(|url| self.insert(category, url.as_ref()))
            .count()
    }

    pub fn urls(&self, category: AssetCategory) -> &[String] {
        self.entries
            .get(&category)
            .map(|c| c.urls.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, category: AssetCategory, url: &str) -> bool {
        self.entries
            .get(&category)
            .map(|c| c.seen.contains(url))
            .unwrap_or(false)
    }

    pub fn count(&self, category: AssetCategory) -> usize {
        self.urls(category).len()
    }

    pub fn total(&self) -> usize {
        AssetCategory::ALL.iter().map(|c| self.count(*c)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Every `(category, index, url)` triple in manifest order.
    pub fn iter(&self) -> impl Iterator<Item = (AssetCategory, usize, &str)> + '_ {
        AssetCategory::ALL.into_iter().flat_map(move |category| {
            self.urls(category)
                .iter()
                .enumerate()
                .map(move |(index, url)| (category, index, url.as_str()))
        })
    }
}

//! Asset discovery over a rendered page.
//!
//! The page is seen through [`DomQuery`], a handful of read-only queries that
//! return raw values (resolved element URLs, computed background values,
//! `@font-face` sources). Filtering, URL extraction and resolution happen here.

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::DriverError;
use crate::registry::{AssetCategory, AssetRegistry};

/// `@font-face` sources of one stylesheet.
#[derive(Debug, Clone, PartialEq)]
pub struct FontFaceSheet {
    /// Stylesheet URL, `None` for inline `<style>` blocks.
    pub href: Option<String>,
    /// The `src` value of every `@font-face` rule, or why the sheet's rules
    /// could not be read (cross-origin sheets, for instance).
    pub sources: Result<Vec<String>, String>,
}

/// Read-only queries against a fully rendered document.
///
/// Element URLs are returned resolved, the way the DOM's `href`, `src` and
/// `data` properties report them.
#[async_trait]
pub trait DomQuery: Send + Sync {
    /// `href` of every `<link rel="stylesheet">`.
    async fn stylesheet_links(&self) -> Result<Vec<String>, DriverError>;

    /// `src` of every `<script src>`.
    async fn script_sources(&self) -> Result<Vec<String>, DriverError>;

    /// `src` of every `<img src>`.
    async fn image_sources(&self) -> Result<Vec<String>, DriverError>;

    /// Computed `background-image` of every element that has one.
    async fn background_images(&self) -> Result<Vec<String>, DriverError>;

    /// `data` of every `<object type="image/svg+xml">`.
    async fn svg_objects(&self) -> Result<Vec<String>, DriverError>;

    async fn font_faces(&self) -> Result<Vec<FontFaceSheet>, DriverError>;
}

/// Every `url(...)` reference in a CSS value, unquoted, in source order.
pub fn css_urls(value: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let lower = value.to_ascii_lowercase();
    let mut search_from = 0;

    while let Some(found) = lower[search_from..].find("url(") {
        let start = search_from + found + 4;
        let rest = value[start..].trim_start();
        let consumed = value.len() - start - rest.len();

        let (url, len) = match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => match rest[1..].find(quote) {
                Some(end) => (&rest[1..=end], end + 2),
                None => break,
            },
            Some(_) => match rest.find(')') {
                Some(end) => (rest[..end].trim_end(), end),
                None => break,
            },
            None => break,
        };

        if !url.is_empty() {
            urls.push(url.to_string());
        }
        search_from = start + consumed + len;
    }

    urls
}

pub fn is_http_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// `.svg` at the end of the URL or right before its query string.
pub fn is_svg_source(url: &str) -> bool {
    url.ends_with(".svg") || url.contains(".svg?")
}

/// Populates an [`AssetRegistry`] from a rendered page.
pub struct Discoverer<'a> {
    page_url: &'a Url,
}

impl<'a> Discoverer<'a> {
    pub fn new(page_url: &'a Url) -> Self {
        Self { page_url }
    }

    /// Run every query once. A query that fails leaves its category empty.
    pub async fn discover<Q>(&self, dom: &Q) -> AssetRegistry
    where
        Q: DomQuery + ?Sized,
    {
        info!(url = %self.page_url, "extracting assets from page");
        let mut registry = AssetRegistry::new();

        let stylesheets = dom.stylesheet_links().await;
        self.record(&mut registry, AssetCategory::Stylesheet, stylesheets);

        let scripts = dom.script_sources().await;
        self.record(&mut registry, AssetCategory::Script, scripts);

        let images = self.images(dom).await;
        self.record(&mut registry, AssetCategory::Image, images);

        let svgs = self.vector_graphics(dom).await;
        self.record(&mut registry, AssetCategory::VectorGraphic, svgs);

        let fonts = self.fonts(dom).await;
        self.record(&mut registry, AssetCategory::Font, fonts);

        info!(
            css = registry.count(AssetCategory::Stylesheet),
            js = registry.count(AssetCategory::Script),
            images = registry.count(AssetCategory::Image),
            fonts = registry.count(AssetCategory::Font),
            svgs = registry.count(AssetCategory::VectorGraphic),
            "asset discovery complete"
        );
        registry
    }

    fn record(
        &self,
        registry: &mut AssetRegistry,
        category: AssetCategory,
        found: Result<Vec<String>, DriverError>,
    ) {
        match found {
            Ok(urls) => {
                let raw = urls.len();
                let added = registry.extend(category, urls);
                debug!(%category, raw, unique = added, "collected");
            }
            Err(e) => warn!(%category, error = %e, "query failed, category left empty"),
        }
    }

    async fn images<Q>(&self, dom: &Q) -> Result<Vec<String>, DriverError>
    where
        Q: DomQuery + ?Sized,
    {
        let mut images = dom.image_sources().await?;
        let backgrounds = match dom.background_images().await {
            Ok(backgrounds) => backgrounds,
            Err(e) => {
                warn!(error = %e, "background image query failed, keeping <img> sources");
                Vec::new()
            }
        };
        images.extend(
            backgrounds
                .iter()
                .flat_map(|value| css_urls(value))
                .filter(|url| is_http_url(url)),
        );
        Ok(images)
    }

    async fn vector_graphics<Q>(&self, dom: &Q) -> Result<Vec<String>, DriverError>
    where
        Q: DomQuery + ?Sized,
    {
        let mut svgs: Vec<String> = dom
            .image_sources()
            .await?
            .into_iter()
            .filter(|src| is_svg_source(src))
            .collect();
        svgs.extend(dom.svg_objects().await?);
        Ok(svgs)
    }

    async fn fonts<Q>(&self, dom: &Q) -> Result<Vec<String>, DriverError>
    where
        Q: DomQuery + ?Sized,
    {
        let mut fonts = Vec::new();
        for sheet in dom.font_faces().await? {
            let sources = match sheet.sources {
                Ok(sources) => sources,
                Err(reason) => {
                    debug!(href = ?sheet.href, %reason, "stylesheet not introspectable, skipped");
                    continue;
                }
            };
            for url in sources.iter().flat_map(|src| css_urls(src)) {
                if let Some(resolved) = self.resolve_font(&url) {
                    fonts.push(resolved);
                }
            }
        }
        Ok(fonts)
    }

    fn resolve_font(&self, url: &str) -> Option<String> {
        if url.starts_with("data:") {
            return None;
        }
        if is_http_url(url) {
            return Some(url.to_string());
        }
        match self.page_url.join(url) {
            Ok(absolute) => Some(absolute.to_string()),
            Err(e) => {
                warn!(url, error = %e, "could not resolve font URL");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_urls_handles_quoting() {
        let value = r#"url("a.woff2") format("woff2"), url('b.woff'), url( c.ttf )"#;
        assert_eq!(css_urls(value), vec!["a.woff2", "b.woff", "c.ttf"]);
    }

    #[test]
    fn css_urls_of_gradient_is_empty() {
        assert!(css_urls("linear-gradient(red, blue)").is_empty());
        assert!(css_urls("none").is_empty());
    }

    #[test]
    fn css_urls_stops_on_unterminated() {
        assert_eq!(css_urls("url(a.png), url(\"b.png"), vec!["a.png"]);
    }

    #[test]
    fn css_urls_mixed_layers() {
        let value = r#"linear-gradient(red, blue), URL("https://cdn.x/bg.png")"#;
        assert_eq!(css_urls(value), vec!["https://cdn.x/bg.png"]);
    }

    #[test]
    fn svg_detection() {
        assert!(is_svg_source("https://x/logo.svg"));
        assert!(is_svg_source("https://x/logo.svg?v=3"));
        assert!(!is_svg_source("https://x/logo.svgz"));
        assert!(!is_svg_source("https://x/logo.png"));
    }

    #[test]
    fn http_detection() {
        assert!(is_http_url("https://x/a.png"));
        assert!(is_http_url("HTTP://x/a.png"));
        assert!(!is_http_url("data:image/png;base64,AAAA"));
        assert!(!is_http_url("/relative.png"));
    }

    #[test]
    fn fonts_resolve_against_page() {
        let page = Url::parse("https://site.test/blog/post.html").unwrap();
        let discoverer = Discoverer::new(&page);
        assert_eq!(
            discoverer.resolve_font("../fonts/a.woff2").as_deref(),
            Some("https://site.test/fonts/a.woff2")
        );
        assert_eq!(
            discoverer.resolve_font("https://cdn.test/b.woff").as_deref(),
            Some("https://cdn.test/b.woff")
        );
        assert_eq!(discoverer.resolve_font("data:font/woff2;base64,AA"), None);
    }
}

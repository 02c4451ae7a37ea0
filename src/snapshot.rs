//! [`DomQuery`] over a frozen HTML document.
//!
//! Used for already-serialized pages and as the DOM behind test drivers.
//! There is no style engine here: inline `style` attributes stand in for
//! computed background images, `<style>` blocks are the only stylesheets
//! whose rules can be read, and linked stylesheets report as unreadable.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

use crate::discover::{css_urls, DomQuery, FontFaceSheet};
use crate::error::DriverError;

static STYLESHEET_LINKS: Lazy<Selector> = Lazy::new(|| selector("link[rel='stylesheet'][href]"));
static SCRIPTS: Lazy<Selector> = Lazy::new(|| selector("script[src]"));
static IMAGES: Lazy<Selector> = Lazy::new(|| selector("img[src]"));
static STYLED: Lazy<Selector> = Lazy::new(|| selector("[style]"));
static SVG_OBJECTS: Lazy<Selector> = Lazy::new(|| selector("object[type='image/svg+xml']"));
static STYLE_BLOCKS: Lazy<Selector> = Lazy::new(|| selector("style"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css}: {e:?}"))
}

/// A parsed-on-demand HTML snapshot and the URL it was served from.
#[derive(Debug, Clone)]
pub struct SnapshotDom {
    html: String,
    base_url: Url,
}

impl SnapshotDom {
    pub fn new(html: impl Into<String>, base_url: Url) -> Self {
        Self {
            html: html.into(),
            base_url,
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn resolve(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        self.base_url.join(reference).ok().map(|u| u.to_string())
    }

    fn attribute_urls(&self, selector: &Selector, attribute: &str) -> Vec<String> {
        let document = Html::parse_document(&self.html);
        document
            .select(selector)
            .filter_map(|el| el.value().attr(attribute))
            .filter_map(|value| self.resolve(value))
            .collect()
    }

    fn inline_backgrounds(&self) -> Vec<String> {
        let document = Html::parse_document(&self.html);
        document
            .select(&STYLED)
            .filter_map(|el| el.value().attr("style"))
            .filter_map(background_value)
            .map(|value| self.absolutize_css_urls(&value))
            .collect()
    }

    /// Computed styles report absolute URLs; mirror that.
    fn absolutize_css_urls(&self, value: &str) -> String {
        css_urls(value)
            .iter()
            .filter_map(|url| self.resolve(url))
            .map(|url| format!("url(\"{url}\")"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn style_sheets(&self) -> Vec<FontFaceSheet> {
        let document = Html::parse_document(&self.html);

        let linked = document
            .select(&STYLESHEET_LINKS)
            .filter_map(|el| el.value().attr("href"))
            .map(|href| FontFaceSheet {
                href: self.resolve(href),
                sources: Err("rules of linked stylesheets are not available".to_string()),
            });

        let inline = document.select(&STYLE_BLOCKS).map(|el| {
            let css: String = el.text().collect();
            FontFaceSheet {
                href: None,
                sources: Ok(font_face_sources(&css)),
            }
        });

        linked.chain(inline).collect()
    }
}

/// `background-image` (or the image part of `background`) from an inline
/// style declaration list.
fn background_value(style: &str) -> Option<String> {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .filter(|(name, _)| {
            let name = name.trim().to_ascii_lowercase();
            name == "background-image" || name == "background"
        })
        .map(|(_, value)| value.trim().to_string())
        .find(|value| value.to_ascii_lowercase().contains("url("))
}

/// The `src` descriptor of every `@font-face` block in a stylesheet.
pub fn font_face_sources(css: &str) -> Vec<String> {
    let lower = css.to_ascii_lowercase();
    let mut sources = Vec::new();
    let mut search_from = 0;

    while let Some(found) = lower[search_from..].find("@font-face") {
        let at = search_from + found;
        let Some(open) = lower[at..].find('{').map(|i| at + i + 1) else {
            break;
        };
        let Some(close) = lower[open..].find('}').map(|i| open + i) else {
            break;
        };

        for decl in css[open..close].split(';') {
            if let Some((name, value)) = decl.split_once(':') {
                if name.trim().eq_ignore_ascii_case("src") {
                    sources.push(value.trim().to_string());
                }
            }
        }
        search_from = close + 1;
    }

    sources
}

#[async_trait]
impl DomQuery for SnapshotDom {
    async fn stylesheet_links(&self) -> Result<Vec<String>, DriverError> {
        Ok(self.attribute_urls(&STYLESHEET_LINKS, "href"))
    }

    async fn script_sources(&self) -> Result<Vec<String>, DriverError> {
        Ok(self.attribute_urls(&SCRIPTS, "src"))
    }

    async fn image_sources(&self) -> Result<Vec<String>, DriverError> {
        Ok(self.attribute_urls(&IMAGES, "src"))
    }

    async fn background_images(&self) -> Result<Vec<String>, DriverError> {
        Ok(self.inline_backgrounds())
    }

    async fn svg_objects(&self) -> Result<Vec<String>, DriverError> {
        Ok(self.attribute_urls(&SVG_OBJECTS, "data"))
    }

    async fn font_faces(&self) -> Result<Vec<FontFaceSheet>, DriverError> {
        Ok(self.style_sheets())
    }
}

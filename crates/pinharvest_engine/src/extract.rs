use pinharvest_core::resolve_link;
use scraper::{Html, Selector};

/// Container that wraps the full-resolution image on a pin page.
pub const PIN_CLOSEUP_CONTAINER: &str = r#"div[data-test-id="pin-closeup-image"]"#;
const IMAGE_ELEMENT: &str = "img";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("no element matches '{0}'")]
    MissingContainer(String),
    #[error("container has no <img> element")]
    MissingImage,
    #[error("<img> has no usable src attribute")]
    MissingSource,
}

/// Pulls the one image reference a page is expected to carry.
pub trait LinkExtractor: Send + Sync {
    fn extract(&self, html: &str, base_url: Option<&str>) -> Result<String, ExtractError>;
}

/// Finds the first container matching a structural selector, then its first
/// nested `<img>`, then that image's `src`.
#[derive(Debug, Clone)]
pub struct ImageLinkExtractor {
    container_css: String,
    container: Selector,
    image: Selector,
}

impl ImageLinkExtractor {
    pub fn new(container_css: &str) -> Result<Self, ExtractError> {
        Ok(Self {
            container_css: container_css.to_string(),
            container: parse_selector(container_css)?,
            image: parse_selector(IMAGE_ELEMENT)?,
        })
    }

    /// Extractor for pin close-up pages.
    pub fn pin_closeup() -> Result<Self, ExtractError> {
        Self::new(PIN_CLOSEUP_CONTAINER)
    }
}

impl LinkExtractor for ImageLinkExtractor {
    fn extract(&self, html: &str, base_url: Option<&str>) -> Result<String, ExtractError> {
        let doc = Html::parse_document(html);
        let container = doc
            .select(&self.container)
            .next()
            .ok_or_else(|| ExtractError::MissingContainer(self.container_css.clone()))?;
        let image = container
            .select(&self.image)
            .next()
            .ok_or(ExtractError::MissingImage)?;
        let src = image
            .value()
            .attr("src")
            .map(str::trim)
            .filter(|src| !src.is_empty())
            .ok_or(ExtractError::MissingSource)?;

        match base_url {
            Some(base) => resolve_link(base, src).ok_or(ExtractError::MissingSource),
            None => Ok(src.to_string()),
        }
    }
}

/// Extracts the full-resolution image URL from a pin page.
pub fn extract_link(html: &str) -> Result<String, ExtractError> {
    ImageLinkExtractor::pin_closeup()?.extract(html, None)
}

fn parse_selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|err| ExtractError::InvalidSelector {
        selector: css.to_string(),
        message: err.to_string(),
    })
}

//! Heuristics that decide whether an element needs polyfilling and where its
//! image lives.

use crate::config::PolyfillConfig;
use crate::dom::{Element, SRC_ATTR};

/// Where an element's image comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceRef {
    /// Raw, possibly relative, image reference.
    pub url: String,
    /// Override attribute the reference was read from, if any. The machine
    /// removes it once the element has been polyfilled.
    pub override_attr: Option<String>,
}

/// Classifies elements and extracts their image reference.
pub trait Detector: Send + Sync {
    /// Whether an `<img>` references the unsupported format.
    fn is_format_image(&self, element: &Element) -> bool;
    /// Whether a container's background references the unsupported format.
    fn is_format_background(&self, element: &Element) -> bool;
    /// Source reference of an image.
    fn image_source(&self, element: &Element) -> Option<SourceRef>;
    /// Source reference of a container background.
    fn background_source(&self, element: &Element) -> Option<SourceRef>;
}

/// Default detector: naive, case-insensitive file extension matching.
#[derive(Clone, Debug)]
pub struct ExtensionDetector {
    extension: String,
    image_override_attr: String,
    background_override_attr: String,
}

impl ExtensionDetector {
    pub fn new(
        extension: &str,
        image_override_attr: impl Into<String>,
        background_override_attr: impl Into<String>,
    ) -> Self {
        Self {
            extension: format!(".{}", extension.trim_start_matches('.').to_ascii_lowercase()),
            image_override_attr: image_override_attr.into(),
            background_override_attr: background_override_attr.into(),
        }
    }

    /// WebP detector with the override attributes named in `config`.
    pub fn from_config(config: &PolyfillConfig) -> Self {
        Self::new(
            "webp",
            config.image_override_attr.as_str(),
            config.background_override_attr.as_str(),
        )
    }

    fn mentions_extension(&self, value: &str) -> bool {
        value.to_ascii_lowercase().contains(&self.extension)
    }

    fn override_source(&self, element: &Element, attr: &str) -> Option<SourceRef> {
        let value = element.attribute(attr)?;
        let url = css_url(&value).unwrap_or(value.trim());
        (!url.is_empty()).then(|| SourceRef {
            url: url.to_owned(),
            override_attr: Some(attr.to_owned()),
        })
    }
}

impl Default for ExtensionDetector {
    fn default() -> Self {
        Self::from_config(&PolyfillConfig::default())
    }
}

impl Detector for ExtensionDetector {
    fn is_format_image(&self, element: &Element) -> bool {
        self.image_source(element)
            .is_some_and(|source| self.mentions_extension(&source.url))
    }

    fn is_format_background(&self, element: &Element) -> bool {
        self.background_source(element)
            .is_some_and(|source| self.mentions_extension(&source.url))
    }

    fn image_source(&self, element: &Element) -> Option<SourceRef> {
        if let Some(source) = self.override_source(element, &self.image_override_attr) {
            return Some(source);
        }
        let src = element.attribute(SRC_ATTR)?;
        let src = src.trim();
        (!src.is_empty()).then(|| SourceRef {
            url: src.to_owned(),
            override_attr: None,
        })
    }

    fn background_source(&self, element: &Element) -> Option<SourceRef> {
        if let Some(source) = self.override_source(element, &self.background_override_attr) {
            return Some(source);
        }
        let style = element.background_image()?;
        css_url(&style).map(|url| SourceRef {
            url: url.to_owned(),
            override_attr: None,
        })
    }
}

/// Extract the target of the first `url(...)` in a CSS value, without quotes.
pub fn css_url(value: &str) -> Option<&str> {
    let start = value.to_ascii_lowercase().find("url(")? + "url(".len();
    let rest = &value[start..];
    let end = rest.find(')')?;
    let inner = rest[..end].trim();
    let inner = inner
        .strip_prefix('"')
        .and_then(|val| val.strip_suffix('"'))
        .or_else(|| inner.strip_prefix('\'').and_then(|val| val.strip_suffix('\'')))
        .unwrap_or(inner)
        .trim();
    (!inner.is_empty()).then_some(inner)
}

//! Host document model mutated by the polyfill.
//!
//! Elements are cheap shared handles so the same node can sit in the pending
//! queue while the host keeps its own reference. Documents are flat lists of
//! elements in document order with a base URL for resolving relative sources.

use crate::error::{MachineError, Result};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::Arc;
use url::Url;

/// Primary source attribute of images.
pub const SRC_ATTR: &str = "src";

/// How the polyfill treats an element.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ElementKind {
    /// An `<img>`; the result replaces its `src`.
    Image,
    /// Any other element; the result replaces its background image.
    Container,
}

#[derive(Debug, Default)]
struct ElementData {
    attrs: SmallVec<(String, String), 4>,
    background_image: Option<String>,
    base_url: Option<Url>,
}

#[derive(Debug)]
struct ElementNode {
    tag: String,
    data: RwLock<ElementData>,
}

/// Shared handle to a document element.
#[derive(Clone, Debug)]
pub struct Element(Arc<ElementNode>);

impl Element {
    /// Create a detached element. Tag names are stored lowercase.
    pub fn new(tag: &str) -> Self {
        Self(Arc::new(ElementNode {
            tag: tag.to_ascii_lowercase(),
            data: RwLock::new(ElementData::default()),
        }))
    }

    /// Create an `<img>` with the given `src`.
    pub fn image(src: &str) -> Self {
        Self::new("img").with_attr(SRC_ATTR, src)
    }

    /// Create a `<div>` whose inline style sets `background-image: url("...")`.
    pub fn background(url: &str) -> Self {
        let element = Self::new("div");
        element.set_background_image(&format!("url(\"{url}\")"));
        element
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with_attr(self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    pub fn kind(&self) -> ElementKind {
        if self.0.tag == "img" {
            ElementKind::Image
        } else {
            ElementKind::Container
        }
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.0
            .data
            .read()
            .attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        let mut data = self.0.data.write();
        if let Some(slot) = data
            .attrs
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            value.clone_into(&mut slot.1);
            return;
        }
        data.attrs.push((name.to_ascii_lowercase(), value.to_owned()));
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        let mut data = self.0.data.write();
        let index = data
            .attrs
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(data.attrs.remove(index).1)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|name| name == class))
    }

    /// Inline `background-image` style value, if set.
    pub fn background_image(&self) -> Option<String> {
        self.0.data.read().background_image.clone()
    }

    pub fn set_background_image(&self, value: &str) {
        self.0.data.write().background_image = Some(value.to_owned());
    }

    /// Base URL inherited from the owning document.
    pub fn base_url(&self) -> Option<Url> {
        self.0.data.read().base_url.clone()
    }

    /// Whether both handles point at the same element.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn adopt(&self, base_url: &Url) {
        self.0.data.write().base_url = Some(base_url.clone());
    }
}

/// A flat host document.
#[derive(Debug)]
pub struct Document {
    base_url: Url,
    elements: Vec<Element>,
}

impl Document {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            elements: Vec::new(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append an element, adopting it into this document. Returns the handle.
    pub fn append(&mut self, element: Element) -> Element {
        element.adopt(&self.base_url);
        self.elements.push(element.clone());
        element
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// All elements matching a selector list, in document order.
    ///
    /// Supports comma-separated compound selectors built from a tag name or `*`,
    /// `.class`, `#id`, `[attr]` and `[attr=value]`. Combinators are rejected.
    pub fn select(&self, selectors: &str) -> Result<Vec<Element>> {
        let parsed = SelectorList::parse(selectors)?;
        Ok(self
            .elements
            .iter()
            .filter(|element| parsed.matches(element))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

impl Compound {
    fn matches(&self, element: &Element) -> bool {
        if self.tag.as_deref().is_some_and(|tag| tag != element.tag()) {
            return false;
        }
        if let Some(id) = &self.id
            && element.attribute("id").as_deref() != Some(id.as_str())
        {
            return false;
        }
        if !self.classes.iter().all(|class| element.has_class(class)) {
            return false;
        }
        self.attrs.iter().all(|(name, expected)| {
            match (element.attribute(name), expected) {
                (Some(actual), Some(expected)) => actual == *expected,
                (Some(_), None) => true,
                (None, _) => false,
            }
        })
    }
}

#[derive(Debug)]
struct SelectorList(Vec<Compound>);

impl SelectorList {
    fn parse(selectors: &str) -> Result<Self> {
        let invalid = |reason: &str| MachineError::InvalidSelector {
            selector: selectors.to_owned(),
            reason: reason.to_owned(),
        };
        let mut list = Vec::new();
        for part in selectors.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(invalid("empty selector in list"));
            }
            list.push(parse_compound(part).map_err(|reason| invalid(&reason))?);
        }
        Ok(Self(list))
    }

    fn matches(&self, element: &Element) -> bool {
        self.0.iter().any(|compound| compound.matches(element))
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

fn take_ident(rest: &mut &str) -> Option<String> {
    let end = rest.find(|ch: char| !is_ident_char(ch)).unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    let (ident, tail) = rest.split_at(end);
    *rest = tail;
    Some(ident.to_owned())
}

fn parse_compound(text: &str) -> core::result::Result<Compound, String> {
    let mut compound = Compound::default();
    let mut rest = text;
    if let Some(tail) = rest.strip_prefix('*') {
        rest = tail;
    } else if let Some(tag) = take_ident(&mut rest) {
        compound.tag = Some(tag.to_ascii_lowercase());
    }
    while let Some(marker) = rest.chars().next() {
        rest = &rest[marker.len_utf8()..];
        match marker {
            '.' => {
                let class = take_ident(&mut rest).ok_or("expected class name after '.'")?;
                compound.classes.push(class);
            }
            '#' => {
                let id = take_ident(&mut rest).ok_or("expected id after '#'")?;
                compound.id = Some(id);
            }
            '[' => {
                let close = rest.find(']').ok_or("unterminated attribute selector")?;
                let inner = &rest[..close];
                rest = &rest[close + 1..];
                compound.attrs.push(parse_attribute(inner)?);
            }
            other if other.is_whitespace() => {
                return Err("combinators are not supported".to_owned());
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(compound)
}

fn parse_attribute(inner: &str) -> core::result::Result<(String, Option<String>), String> {
    let (name, value) = match inner.split_once('=') {
        Some((name, value)) => {
            let value = value.trim();
            let unquoted = value
                .strip_prefix('"')
                .and_then(|val| val.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|val| val.strip_suffix('\'')))
                .unwrap_or(value);
            (name.trim(), Some(unquoted.to_owned()))
        }
        None => (inner.trim(), None),
    };
    if name.is_empty() || !name.chars().all(is_ident_char) {
        return Err(format!("invalid attribute name '{name}'"));
    }
    Ok((name.to_ascii_lowercase(), value))
}

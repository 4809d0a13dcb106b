use core::fmt::{Display, Formatter, Result as FmtResult};
use std::error::Error;

/// Errors produced while decoding or polyfilling images.
///
/// Each variant is built once with its context attached. Wrapping variants keep
/// the underlying failure reachable through [`Error::source`] so callers can walk
/// the full causal chain.
#[derive(Debug)]
pub enum MachineError {
    /// A decode was attempted while another decode held the slot.
    Busy,
    /// The decoder rejected the bytes or the surface could not be serialized.
    DecodeFailed {
        /// Failure reported by the decoder or surface.
        source: anyhow::Error,
    },
    /// The raw bytes could not be obtained.
    FetchFailed {
        /// Resolved URL that was requested.
        url: String,
        /// Failure reported by the fetcher.
        source: anyhow::Error,
    },
    /// A source reference could not be resolved into an absolute URL.
    InvalidUrl {
        /// The raw reference as found on the element.
        url: String,
        /// Parser failure.
        source: url::ParseError,
    },
    /// A document selector uses syntax the document model does not understand.
    InvalidSelector {
        /// Offending selector list.
        selector: String,
        /// What went wrong while parsing.
        reason: String,
    },
    /// Polyfilling a single element failed; names the offending URL.
    PolyfillFailed {
        /// URL of the image being polyfilled.
        url: String,
        /// The failure that stopped the polyfill.
        source: Box<MachineError>,
    },
}

impl MachineError {
    /// Wrap a failure that happened while polyfilling `url`.
    pub fn polyfill(url: impl Into<String>, source: Self) -> Self {
        Self::PolyfillFailed {
            url: url.into(),
            source: Box::new(source),
        }
    }

    /// The URL this error is attached to, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::FetchFailed { url, .. }
            | Self::InvalidUrl { url, .. }
            | Self::PolyfillFailed { url, .. } => Some(url),
            Self::Busy | Self::DecodeFailed { .. } | Self::InvalidSelector { .. } => None,
        }
    }

    /// Innermost `MachineError` of a wrapped chain.
    pub fn root(&self) -> &Self {
        match self {
            Self::PolyfillFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the chain bottoms out in a busy decode slot.
    pub fn is_busy(&self) -> bool {
        matches!(self.root(), Self::Busy)
    }
}

impl Display for MachineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Busy => write!(f, "cannot decode when already busy"),
            Self::DecodeFailed { .. } => write!(f, "failed to decode webp image"),
            Self::FetchFailed { url, .. } => write!(f, "failed to fetch \"{url}\""),
            Self::InvalidUrl { url, .. } => write!(f, "invalid image url \"{url}\""),
            Self::InvalidSelector { selector, reason } => {
                write!(f, "unsupported selector \"{selector}\": {reason}")
            }
            Self::PolyfillFailed { url, .. } => write!(f, "failed to polyfill image \"{url}\""),
        }
    }
}

impl Error for MachineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::DecodeFailed { source } | Self::FetchFailed { source, .. } => Some(&**source),
            Self::InvalidUrl { source, .. } => Some(source),
            Self::PolyfillFailed { source, .. } => Some(&**source),
            Self::Busy | Self::InvalidSelector { .. } => None,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = MachineError> = core::result::Result<T, E>;

//! Runtime configuration for the polyfill machine.
//!
//! Configuration can be loaded from environment variables or constructed
//! programmatically. Values that are absent or fail to parse fall back to the
//! defaults.

use core::str::FromStr;
use log::warn;
use std::env;

/// Default selector used when a document scan does not name one.
pub const DEFAULT_SELECTORS: &str = "img";
/// Default attribute holding a pending image source that overrides `src`.
pub const DEFAULT_IMAGE_OVERRIDE: &str = "data-webp-src";
/// Default attribute holding a pending background source for containers.
pub const DEFAULT_BACKGROUND_OVERRIDE: &str = "data-bg";

/// What the document worker loop does when a single element fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failure and discard everything still queued.
    #[default]
    Abort,
    /// Log the failure, record it in the report and keep draining.
    Continue,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(format!("unknown failure policy '{other}'")),
        }
    }
}

/// Runtime configuration for a [`WebpMachine`](crate::WebpMachine).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolyfillConfig {
    /// Selector list used by document scans that do not pass their own.
    pub selectors: String,
    /// Worker loop behaviour on per-element failure.
    pub failure_policy: FailurePolicy,
    /// Whether the decode slot yields to the scheduler once before decoding.
    pub relax_before_decode: bool,
    /// Attribute that overrides `src` on images.
    pub image_override_attr: String,
    /// Attribute that carries a background source on containers.
    pub background_override_attr: String,
}

impl PolyfillConfig {
    /// Construct a configuration with explicit selector and failure policy,
    /// keeping the default override attributes and yielding behaviour.
    #[must_use]
    pub fn new(selectors: impl Into<String>, failure_policy: FailurePolicy) -> Self {
        Self {
            selectors: selectors.into(),
            failure_policy,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `WEBP_MACHINE_SELECTORS`: default document selector (default: `img`)
    /// - `WEBP_MACHINE_FAILURE_POLICY`: `abort` or `continue` (default: `abort`)
    /// - `WEBP_MACHINE_YIELD`: set to "0" to decode without yielding first
    /// - `WEBP_MACHINE_IMAGE_OVERRIDE`: image override attribute (default: `data-webp-src`)
    /// - `WEBP_MACHINE_BACKGROUND_OVERRIDE`: container override attribute (default: `data-bg`)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from any variable source, using the same names and
    /// fallbacks as [`from_env`](Self::from_env).
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|val| val.trim().to_owned())
                .filter(|val| !val.is_empty())
        };
        let defaults = Self::default();
        let selectors = non_empty("WEBP_MACHINE_SELECTORS").unwrap_or(defaults.selectors);
        let failure_policy = lookup("WEBP_MACHINE_FAILURE_POLICY")
            .and_then(|val| {
                val.parse::<FailurePolicy>()
                    .inspect_err(|err| {
                        warn!(target: "webp_machine", "{err}; falling back to abort");
                    })
                    .ok()
            })
            .unwrap_or_default();
        let relax_before_decode =
            lookup("WEBP_MACHINE_YIELD").as_deref().map(str::trim) != Some("0");
        let image_override_attr =
            non_empty("WEBP_MACHINE_IMAGE_OVERRIDE").unwrap_or(defaults.image_override_attr);
        let background_override_attr = non_empty("WEBP_MACHINE_BACKGROUND_OVERRIDE")
            .unwrap_or(defaults.background_override_attr);
        Self {
            selectors,
            failure_policy,
            relax_before_decode,
            image_override_attr,
            background_override_attr,
        }
    }

    /// Replace the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}

impl Default for PolyfillConfig {
    fn default() -> Self {
        Self {
            selectors: DEFAULT_SELECTORS.to_owned(),
            failure_policy: FailurePolicy::Abort,
            relax_before_decode: true,
            image_override_attr: DEFAULT_IMAGE_OVERRIDE.to_owned(),
            background_override_attr: DEFAULT_BACKGROUND_OVERRIDE.to_owned(),
        }
    }
}

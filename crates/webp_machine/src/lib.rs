//! WebP polyfill core.
//!
//! Detects elements that reference WebP images, fetches the raw bytes, decodes
//! them through a single non-reentrant decoder and swaps the reference for a PNG
//! data URL.
//!
//! # Architecture
//!
//! ```text
//! polyfill_document ──► PendingQueue ──► worker loop (one per machine)
//!                                              │
//! polyfill_element ────────────────────────────┤
//!                                              ▼
//!                        ResultCache ◄── Fetcher ──► DecodeSlot ──► Decoder
//! ```
//!
//! - [`DecodeSlot`] allows one decode in flight and rejects the rest with
//!   [`MachineError::Busy`].
//! - [`ResultCache`] memoizes decoded results by resolved URL.
//! - [`PendingQueue`] merges overlapping document scans, newest batch first.
//! - [`WebpMachine`] ties them together.
//!
//! # Example
//!
//! ```ignore
//! use webp_machine::{Document, Element, WebpMachine};
//!
//! let mut document = Document::new(base_url);
//! document.append(Element::image("photos/cat.webp"));
//!
//! let machine = WebpMachine::with_defaults();
//! machine.polyfill_document(&document, None).await?;
//! ```

#![allow(clippy::missing_errors_doc, reason = "Errors are documented on the public entry points")]

mod cache;
mod config;
mod decoder;
mod detect;
mod dom;
mod error;
mod fetch;
mod machine;
mod queue;
mod slot;

pub mod support;

pub use cache::ResultCache;
pub use config::{
    DEFAULT_BACKGROUND_OVERRIDE, DEFAULT_IMAGE_OVERRIDE, DEFAULT_SELECTORS, FailurePolicy,
    PolyfillConfig,
};
pub use decoder::{Canvas, Decoder, Surface, WebpDecoder};
pub use detect::{Detector, ExtensionDetector, SourceRef, css_url};
pub use dom::{Document, Element, ElementKind, SRC_ATTR};
pub use error::{MachineError, Result};
pub use fetch::{Fetcher, HttpFetcher, decode_data_url};
pub use machine::{DocumentReport, WebpMachine};
pub use queue::PendingQueue;
pub use slot::DecodeSlot;
pub use support::SupportFuture;

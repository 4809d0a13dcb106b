//! The polyfill orchestrator.
//!
//! A [`WebpMachine`] owns the decode slot, the result cache and the pending
//! queue. Per-element polyfills go straight through the cache and slot.
//! Document scans enqueue their matches as one batch and either start the
//! single worker loop or, if one is already draining, leave the batch for it.

use crate::cache::ResultCache;
use crate::config::{FailurePolicy, PolyfillConfig};
use crate::decoder::{Decoder, WebpDecoder};
use crate::detect::{Detector, ExtensionDetector, SourceRef};
use crate::dom::{Document, Element, ElementKind, SRC_ATTR};
use crate::error::{MachineError, Result};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::queue::PendingQueue;
use crate::slot::DecodeSlot;
use crate::support::{self, SupportFuture};
use bytes::Bytes;
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use url::Url;

/// Queue and processing flag, always mutated together.
#[derive(Debug, Default)]
struct DrainState {
    queue: PendingQueue<Element>,
    processing: bool,
}

/// Proof that the holder is the one active worker loop.
///
/// Dropping the lease clears the processing flag, so an aborted or cancelled
/// loop never leaves the machine stuck.
struct WorkerLease<'machine> {
    state: &'machine Mutex<DrainState>,
    released: bool,
}

impl WorkerLease<'_> {
    /// Next queued element. When the queue is empty the lease is released in
    /// the same critical section, so no batch can slip in unobserved.
    fn next_element(&mut self) -> Option<Element> {
        let mut state = self.state.lock();
        let next = state.queue.dequeue();
        if next.is_none() {
            state.processing = false;
            self.released = true;
        }
        next
    }

    /// Discard everything still queued and release the loop.
    fn abandon(mut self) -> usize {
        let mut state = self.state.lock();
        state.processing = false;
        self.released = true;
        state.queue.clear()
    }
}

impl Drop for WorkerLease<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.state.lock().processing = false;
        }
    }
}

/// Outcome of a [`WebpMachine::polyfill_document`] call.
#[derive(Debug, Default)]
pub struct DocumentReport {
    /// Elements this call matched and enqueued.
    pub queued: usize,
    /// The batch was handed to a loop that was already running.
    pub merged: bool,
    /// Elements this call's loop dispatched without error, across all batches.
    pub processed: usize,
    /// Failures recorded under [`FailurePolicy::Continue`].
    pub failures: Vec<MachineError>,
}

/// Decodes and polyfills WebP images, one decode at a time.
pub struct WebpMachine<F, D> {
    fetcher: F,
    slot: DecodeSlot<D>,
    cache: ResultCache,
    detector: Box<dyn Detector>,
    support: SupportFuture,
    config: PolyfillConfig,
    drain: Mutex<DrainState>,
}

impl WebpMachine<HttpFetcher, WebpDecoder> {
    /// Machine with the default fetcher, decoder and environment configuration,
    /// assuming the host has no native support.
    pub fn with_defaults() -> Self {
        Self::new(
            HttpFetcher::default(),
            WebpDecoder::default(),
            PolyfillConfig::from_env(),
        )
    }
}

impl<F: Fetcher, D: Decoder> WebpMachine<F, D> {
    pub fn new(fetcher: F, decoder: D, config: PolyfillConfig) -> Self {
        Self {
            fetcher,
            slot: DecodeSlot::new(decoder, config.relax_before_decode),
            cache: ResultCache::new(),
            detector: Box::new(ExtensionDetector::from_config(&config)),
            support: support::assume(false),
            config,
            drain: Mutex::new(DrainState::default()),
        }
    }

    /// Replace the native support answer.
    #[must_use]
    pub fn with_support(mut self, support: SupportFuture) -> Self {
        self.support = support;
        self
    }

    /// Replace the element detector.
    #[must_use]
    pub fn with_detector(mut self, detector: impl Detector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    pub fn config(&self) -> &PolyfillConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Run `f` against the decoder.
    pub fn with_decoder<R>(&self, f: impl FnOnce(&D) -> R) -> R {
        self.slot.with_decoder(f)
    }

    /// Whether a worker loop is currently draining the queue.
    pub fn is_processing(&self) -> bool {
        self.drain.lock().processing
    }

    /// Number of elements waiting in the queue.
    pub fn pending(&self) -> usize {
        self.drain.lock().queue.len()
    }

    /// Whether the host decodes WebP itself. Resolved once.
    pub async fn natively_supported(&self) -> bool {
        self.support.clone().await
    }

    /// Decode raw WebP bytes into a PNG data URL.
    ///
    /// # Errors
    ///
    /// Fails with [`MachineError::Busy`] if a decode is already in flight, or
    /// [`MachineError::DecodeFailed`] if the bytes cannot be decoded.
    pub async fn decode(&self, data: Bytes) -> Result<String> {
        self.slot.decode(data).await
    }

    /// Polyfill one element, dispatching on its kind.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::PolyfillFailed`] naming the image URL when
    /// resolving, fetching or decoding fails.
    pub async fn polyfill_element(&self, element: &Element) -> Result<()> {
        match element.kind() {
            ElementKind::Image => self.polyfill_image(element).await,
            ElementKind::Container => self.polyfill_background(element).await,
        }
    }

    /// Polyfill an `<img>`, replacing its `src` with the decoded data URL.
    ///
    /// # Errors
    ///
    /// See [`Self::polyfill_element`].
    pub async fn polyfill_image(&self, element: &Element) -> Result<()> {
        if self.natively_supported().await || !self.detector.is_format_image(element) {
            return Ok(());
        }
        let Some(source) = self.detector.image_source(element) else {
            return Ok(());
        };
        self.polyfill_source(element, ElementKind::Image, source)
            .await
    }

    /// Polyfill a container, replacing its background image.
    ///
    /// # Errors
    ///
    /// See [`Self::polyfill_element`].
    pub async fn polyfill_background(&self, element: &Element) -> Result<()> {
        if self.natively_supported().await || !self.detector.is_format_background(element) {
            return Ok(());
        }
        let Some(source) = self.detector.background_source(element) else {
            return Ok(());
        };
        self.polyfill_source(element, ElementKind::Container, source)
            .await
    }

    async fn polyfill_source(
        &self,
        element: &Element,
        kind: ElementKind,
        source: SourceRef,
    ) -> Result<()> {
        let url = resolve(element, &source.url)
            .map_err(|err| MachineError::polyfill(source.url.as_str(), err))?;
        let key = url.as_str();

        if let Some(cached) = self.cache.get(key) {
            trace!(target: "webp_machine", "cache hit for {key}");
            apply(element, kind, &cached, &source);
            return Ok(());
        }

        let data_url = self
            .load(&url)
            .await
            .map_err(|err| MachineError::polyfill(key, err))?;
        self.cache.put(key, data_url.as_str());
        apply(element, kind, &data_url, &source);
        debug!(target: "webp_machine", "polyfilled {key}");
        Ok(())
    }

    async fn load(&self, url: &Url) -> Result<String> {
        let data = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|source| MachineError::FetchFailed {
                url: url.to_string(),
                source,
            })?;
        self.slot.decode(data).await
    }

    /// Polyfill every element of `document` matching `selectors`, or the
    /// configured default selector.
    ///
    /// If a worker loop is already draining, the matches are queued ahead of
    /// its remaining work and this call returns at once with `merged` set.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::InvalidSelector`] for unsupported selectors.
    /// Under [`FailurePolicy::Abort`] the first element failure stops the
    /// loop, discards every queued element and is returned.
    pub async fn polyfill_document(
        &self,
        document: &Document,
        selectors: Option<&str>,
    ) -> Result<DocumentReport> {
        if self.natively_supported().await {
            return Ok(DocumentReport::default());
        }
        let selectors = selectors.unwrap_or(&self.config.selectors);
        let batch = document.select(selectors)?;
        let queued = batch.len();

        let Some(lease) = self.submit(batch) else {
            debug!(
                target: "webp_machine",
                "queued {queued} elements for the active worker loop"
            );
            return Ok(DocumentReport {
                queued,
                merged: true,
                ..DocumentReport::default()
            });
        };

        info!(target: "webp_machine", "starting worker loop with {queued} elements");
        let mut report = self.run_worker(lease).await?;
        report.queued = queued;
        Ok(report)
    }

    /// Enqueue a batch; returns a lease if the caller must run the loop.
    fn submit(&self, batch: Vec<Element>) -> Option<WorkerLease<'_>> {
        let mut state = self.drain.lock();
        state.queue.enqueue(batch);
        if state.processing {
            return None;
        }
        state.processing = true;
        Some(WorkerLease {
            state: &self.drain,
            released: false,
        })
    }

    async fn run_worker(&self, mut lease: WorkerLease<'_>) -> Result<DocumentReport> {
        let mut report = DocumentReport::default();
        while let Some(element) = lease.next_element() {
            match self.polyfill_element(&element).await {
                Ok(()) => report.processed += 1,
                Err(err) => match self.config.failure_policy {
                    FailurePolicy::Abort => {
                        let discarded = lease.abandon();
                        warn!(
                            target: "webp_machine",
                            "worker loop aborted, {discarded} queued elements discarded: {err}"
                        );
                        return Err(err);
                    }
                    FailurePolicy::Continue => {
                        warn!(target: "webp_machine", "skipping element: {err}");
                        report.failures.push(err);
                    }
                },
            }
        }
        info!(
            target: "webp_machine",
            "worker loop finished: {} processed, {} failed",
            report.processed,
            report.failures.len()
        );
        Ok(report)
    }
}

fn resolve(element: &Element, raw: &str) -> Result<Url> {
    let parsed = match element.base_url() {
        Some(base) => base.join(raw),
        None => Url::parse(raw),
    };
    parsed.map_err(|source| MachineError::InvalidUrl {
        url: raw.to_owned(),
        source,
    })
}

fn apply(element: &Element, kind: ElementKind, data_url: &str, source: &SourceRef) {
    match kind {
        ElementKind::Image => element.set_attribute(SRC_ATTR, data_url),
        ElementKind::Container => element.set_background_image(&format!("url(\"{data_url}\")")),
    }
    if let Some(attr) = &source.override_attr {
        element.remove_attribute(attr);
    }
}

//! Single decode slot guarding a non-reentrant decoder.
//!
//! The slot is a binary semaphore that rejects on contention: a second decode
//! while one is in flight fails with [`MachineError::Busy`] instead of waiting.

use crate::decoder::{Decoder, Surface as _};
use crate::error::{MachineError, Result};
use bytes::Bytes;
use core::sync::atomic::{AtomicBool, Ordering};
use log::trace;
use parking_lot::Mutex;
use tokio::task::yield_now;

/// Serializes access to a decoder; at most one decode in flight.
#[derive(Debug)]
pub struct DecodeSlot<D> {
    busy: AtomicBool,
    decoder: Mutex<D>,
    relax: bool,
}

/// Holds the slot; releases it on drop, whatever path the decode took.
struct BusyGuard<'slot> {
    busy: &'slot AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

impl<D: Decoder> DecodeSlot<D> {
    /// Wrap `decoder`. With `relax`, every decode yields to the scheduler once
    /// before doing any work.
    pub fn new(decoder: D, relax: bool) -> Self {
        Self {
            busy: AtomicBool::new(false),
            decoder: Mutex::new(decoder),
            relax,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Decode `data` into a data URL on a freshly allocated surface.
    ///
    /// # Errors
    ///
    /// - [`MachineError::Busy`] if another decode holds the slot
    /// - [`MachineError::DecodeFailed`] if the decoder or surface fails
    pub async fn decode(&self, data: Bytes) -> Result<String> {
        let _guard = self.acquire()?;
        if self.relax {
            yield_now().await;
        }
        let mut surface = D::Surface::default();
        self.decoder
            .lock()
            .decode_into(&mut surface, &data)
            .map_err(|source| MachineError::DecodeFailed { source })?;
        trace!(target: "webp_machine", "decoded {} bytes", data.len());
        surface
            .to_data_url()
            .map_err(|source| MachineError::DecodeFailed { source })
    }

    fn acquire(&self) -> Result<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| MachineError::Busy)?;
        Ok(BusyGuard { busy: &self.busy })
    }

    /// Run `f` with exclusive access to the decoder, bypassing the busy flag.
    pub fn with_decoder<R>(&self, f: impl FnOnce(&D) -> R) -> R {
        f(&self.decoder.lock())
    }
}

//! Native format support answers.
//!
//! The answer is a shared future: it resolves once and every later await
//! reuses the result for the lifetime of the machine.

use crate::decoder::Decoder;
use futures::FutureExt as _;
use futures::future::{BoxFuture, Shared, ready};
use log::debug;

/// Shared, resolve-once answer to "does the host decode WebP natively?".
pub type SupportFuture = Shared<BoxFuture<'static, bool>>;

/// 1x1 lossless WebP used to probe a decoder.
pub const SAMPLE_WEBP: [u8; 34] = [
    0x52, 0x49, 0x46, 0x46, 0x1a, 0x00, 0x00, 0x00, 0x57, 0x45, 0x42, 0x50, 0x56, 0x50, 0x38, 0x4c,
    0x0d, 0x00, 0x00, 0x00, 0x2f, 0x00, 0x00, 0x00, 0x10, 0x07, 0x10, 0x11, 0x11, 0x88, 0x88, 0xfe,
    0x07, 0x00,
];

/// A fixed answer.
pub fn assume(supported: bool) -> SupportFuture {
    ready(supported).boxed().shared()
}

/// Wrap an arbitrary host check.
pub fn from_future<F>(check: F) -> SupportFuture
where
    F: Future<Output = bool> + Send + 'static,
{
    check.boxed().shared()
}

/// Supported if the host's own decoder handles the sample image.
///
/// The probe runs lazily on first await.
pub fn probe_decoder<D>(mut native: D) -> SupportFuture
where
    D: Decoder + 'static,
{
    from_future(async move {
        let mut surface = D::Surface::default();
        let supported = native.decode_into(&mut surface, &SAMPLE_WEBP).is_ok();
        debug!(target: "webp_machine", "native webp support probe: {supported}");
        supported
    })
}

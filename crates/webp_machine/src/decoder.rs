//! Decoder capability and the default WebP-to-PNG implementation.
//!
//! A decoder draws into a surface it is handed for the duration of one call;
//! the surface then serializes itself into a data URL. Decoders are stateful
//! and must never be entered concurrently, which is what the
//! [`DecodeSlot`](crate::DecodeSlot) enforces.

use anyhow::{Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder as _, ImageFormat, RgbaImage};
use log::trace;

/// Disposable drawing target produced fresh for every decode.
pub trait Surface: Default + Send {
    /// Serialize the drawn image into a data URL.
    ///
    /// # Errors
    ///
    /// Returns `Err` if nothing was drawn or encoding fails.
    fn to_data_url(&self) -> Result<String>;
}

/// Single-shot decoder bound to one surface per call.
pub trait Decoder: Send {
    type Surface: Surface;

    /// Decode `data` and draw the result onto `surface`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the bytes are not a decodable image.
    fn decode_into(&mut self, surface: &mut Self::Surface, data: &[u8]) -> Result<()>;
}

/// RGBA canvas that encodes to a PNG data URL.
#[derive(Debug, Default)]
pub struct Canvas {
    pixels: Option<RgbaImage>,
}

impl Canvas {
    /// Replace the canvas contents.
    pub fn draw(&mut self, pixels: RgbaImage) {
        self.pixels = Some(pixels);
    }

    pub fn pixels(&self) -> Option<&RgbaImage> {
        self.pixels.as_ref()
    }

    /// Canvas size in pixels, `(0, 0)` while blank.
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels
            .as_ref()
            .map_or((0, 0), RgbaImage::dimensions)
    }
}

impl Surface for Canvas {
    fn to_data_url(&self) -> Result<String> {
        let pixels = self
            .pixels
            .as_ref()
            .ok_or_else(|| anyhow!("canvas has nothing drawn on it"))?;
        let mut buf = Vec::new();
        {
            let encoder = PngEncoder::new(&mut buf);
            encoder.write_image(
                pixels.as_raw(),
                pixels.width(),
                pixels.height(),
                ExtendedColorType::Rgba8,
            )?;
        }
        Ok(format!("data:image/png;base64,{}", BASE64_STANDARD.encode(buf)))
    }
}

/// Decodes WebP with the `image` crate.
#[derive(Debug, Default)]
pub struct WebpDecoder {
    decoded: u64,
}

impl WebpDecoder {
    /// Number of images decoded successfully by this instance.
    pub fn decoded(&self) -> u64 {
        self.decoded
    }
}

impl Decoder for WebpDecoder {
    type Surface = Canvas;

    fn decode_into(&mut self, surface: &mut Canvas, data: &[u8]) -> Result<()> {
        let image = image::load_from_memory_with_format(data, ImageFormat::WebP)
            .map_err(|err| anyhow!("{err}"))?;
        let pixels = image.to_rgba8();
        trace!(
            target: "webp_machine",
            "decoded {} bytes into {}x{} canvas",
            data.len(),
            pixels.width(),
            pixels.height()
        );
        surface.draw(pixels);
        self.decoded = self.decoded.saturating_add(1);
        Ok(())
    }
}

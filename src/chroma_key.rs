//! Chroma-key background removal
//!
//! Classifies every pixel as key-colored background or foreground from its
//! color alone and zeroes the alpha of background pixels. The key is pure
//! green (0, 255, 0) as rendered by the generation service.
//!
//! Thresholds apply to the channel differences `g - r` and `g - b`, which
//! stay stable for one hue across lightness. The brightness floor keeps dark
//! pixels (shadows, black outlines) out of the key.
//!
//! Known limitations:
//! - Green foreground objects are indistinguishable from the key and are
//!   removed too.
//! - Edges are binary. There is no feathering, so boundary pixels may keep a
//!   green fringe.

use crate::{
    error::Result,
    services::ImageCodec,
    types::{EncodedImage, PixelBuffer, ProcessedImage},
};
use instant::Instant;
use tracing::{debug, span, Level};

/// Green must exceed this to count as key color
pub const KEY_BRIGHTNESS_FLOOR: i16 = 90;

/// Green must exceed both red and blue by more than this
pub const KEY_DIFFERENCE_THRESHOLD: i16 = 45;

/// Whether an RGB triple is classified as key-colored background
#[inline]
#[must_use]
pub fn is_key_color(r: u8, g: u8, b: u8) -> bool {
    let (r, g, b) = (i16::from(r), i16::from(g), i16::from(b));
    g > KEY_BRIGHTNESS_FLOOR
        && g - r > KEY_DIFFERENCE_THRESHOLD
        && g - b > KEY_DIFFERENCE_THRESHOLD
}

/// Pure chroma-key segmentation over decoded pixel buffers
pub struct ChromaKeySegmenter;

impl ChromaKeySegmenter {
    /// Return a copy of `buffer` with background pixels made fully transparent
    ///
    /// Only alpha changes; dimensions and color channels are preserved.
    /// Foreground pixels keep their original alpha.
    #[must_use]
    pub fn segment(buffer: &PixelBuffer) -> PixelBuffer {
        let mut result = buffer.clone();
        Self::segment_in_place(&mut result);
        result
    }

    /// Key out background pixels in place, returning how many were keyed
    ///
    /// Pixels that are already transparent are counted again if they match,
    /// so the count reflects classification, not change.
    pub fn segment_in_place(buffer: &mut PixelBuffer) -> usize {
        let mut keyed = 0;
        for px in buffer.pixels_mut() {
            if let [r, g, b, a] = px {
                if is_key_color(*r, *g, *b) {
                    *a = 0;
                    keyed += 1;
                }
            }
        }
        keyed
    }

    /// Decode, key out the background, and re-encode as PNG
    ///
    /// This is the boundary the pipeline runs after generation. Classification
    /// never fails; only the decode and encode steps can.
    ///
    /// # Errors
    /// - `StickerError::Decode` if `image` cannot be decoded
    /// - `StickerError::Encode` if the result cannot be encoded
    pub fn process_encoded(image: &EncodedImage) -> Result<ProcessedImage> {
        let _span = span!(
            Level::DEBUG,
            "chroma_key",
            mime_type = %image.mime_type(),
            bytes = image.len()
        )
        .entered();
        let start = Instant::now();

        let mut buffer = ImageCodec::decode_bytes(image.bytes())?;
        let (width, height) = buffer.dimensions();
        let decoded_ms = start.elapsed().as_millis() as u64;

        let keyed = Self::segment_in_place(&mut buffer);
        let encoded = ImageCodec::encode_png(buffer)?;

        let total_pixels = u64::from(width) * u64::from(height);
        debug!(
            width,
            height,
            keyed,
            total_pixels,
            decode_ms = decoded_ms,
            total_ms = start.elapsed().as_millis() as u64,
            "Chroma key applied"
        );

        Ok(ProcessedImage::new(encoded, width, height))
    }
}

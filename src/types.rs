//! Core types for sticker generation: encoded images and decoded pixel buffers

use crate::{
    error::{Result, StickerError},
    services::ImageCodec,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbaImage;
use std::sync::Arc;

/// Bytes per RGBA8 pixel
pub const CHANNELS: usize = 4;

/// An immutable encoded image (PNG, JPEG, WebP, ...) plus its MIME type
///
/// The bytes are shared, so cloning is cheap. Pipeline snapshots clone
/// images freely.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Arc<[u8]>,
    mime_type: String,
}

impl EncodedImage {
    /// Wrap encoded bytes with an explicit MIME type
    pub fn new<B: Into<Arc<[u8]>>, S: Into<String>>(bytes: B, mime_type: S) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Wrap PNG bytes
    pub fn png<B: Into<Arc<[u8]>>>(bytes: B) -> Self {
        Self::new(bytes, "image/png")
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Render as a self-describing `data:<mime>;base64,<payload>` URI
    #[must_use]
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }

    /// Parse a base64 data URI
    ///
    /// # Errors
    /// - Missing `data:` scheme or `,` separator
    /// - Non-base64 (percent-encoded) payloads
    /// - Invalid base64 payload
    pub fn from_data_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| StickerError::decode("data URI must start with 'data:'"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| StickerError::decode("data URI is missing the ',' separator"))?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| StickerError::decode("only base64 data URIs are supported"))?;

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| StickerError::decode(format!("invalid base64 payload in data URI: {}", e)))?;

        let mime_type = if mime_type.is_empty() {
            "application/octet-stream"
        } else {
            mime_type
        };
        Ok(Self::new(bytes, mime_type))
    }
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Decoded raster image: dense row-major RGBA8 samples
///
/// Invariants: `width >= 1`, `height >= 1` and `data.len() == width * height * 4`,
/// so every buffer can be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Create a pixel buffer from raw RGBA8 samples
    ///
    /// # Errors
    /// - Zero width or height
    /// - `data` length does not equal `width * height * 4`
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = Self::expected_len(width, height)?;
        if data.len() != expected {
            return Err(StickerError::InvalidBuffer(format!(
                "{}x{} RGBA buffer needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Create a buffer with every pixel set to `rgba`
    ///
    /// # Errors
    /// - Zero width or height
    /// - Dimensions overflow the addressable size
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let len = Self::expected_len(width, height)?;
        let data = rgba.iter().copied().cycle().take(len).collect();
        Ok(Self {
            width,
            height,
            data,
        })
    }

    fn expected_len(width: u32, height: u32) -> Result<usize> {
        if width == 0 || height == 0 {
            return Err(StickerError::InvalidBuffer(format!(
                "{}x{} buffer has no pixels; both dimensions must be at least 1",
                width, height
            )));
        }
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(CHANNELS))
            .ok_or_else(|| {
                StickerError::InvalidBuffer(format!("{}x{} exceeds addressable size", width, height))
            })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw RGBA8 samples
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// RGBA sample at `(x, y)`, or `None` outside the buffer
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * CHANNELS;
        let px = self.data.get(start..start + CHANNELS)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Overwrite the RGBA sample at `(x, y)`; returns false outside the buffer
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let start = (y as usize * self.width as usize + x as usize) * CHANNELS;
        match self.data.get_mut(start..start + CHANNELS) {
            Some(px) => {
                px.copy_from_slice(&rgba);
                true
            },
            None => false,
        }
    }

    /// Iterate over pixels as 4-byte RGBA slices
    pub fn pixels(&self) -> std::slice::ChunksExact<'_, u8> {
        self.data.chunks_exact(CHANNELS)
    }

    /// Iterate mutably over pixels as 4-byte RGBA slices
    pub fn pixels_mut(&mut self) -> std::slice::ChunksExactMut<'_, u8> {
        self.data.chunks_exact_mut(CHANNELS)
    }

    /// Convert into an `image` crate buffer for encoding
    ///
    /// # Errors
    /// - Never for a buffer built through this type's constructors
    pub fn into_rgba_image(self) -> Result<RgbaImage> {
        let (width, height) = (self.width, self.height);
        RgbaImage::from_raw(width, height, self.data).ok_or_else(|| {
            StickerError::internal(format!("{}x{} buffer rejected by encoder", width, height))
        })
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

/// The user's photo: encoded bytes plus decoded dimensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    image: EncodedImage,
    width: u32,
    height: u32,
}

impl SourceImage {
    /// Build a source image, reading its dimensions from the encoded header
    ///
    /// # Errors
    /// - The bytes are not a recognizable image
    pub fn from_encoded(image: EncodedImage) -> Result<Self> {
        let (width, height) = ImageCodec::dimensions(image.bytes())?;
        Ok(Self {
            image,
            width,
            height,
        })
    }

    #[must_use]
    pub fn image(&self) -> &EncodedImage {
        &self.image
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Output of the generation service for one source image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    image: EncodedImage,
}

impl GeneratedImage {
    #[must_use]
    pub fn new(image: EncodedImage) -> Self {
        Self { image }
    }

    #[must_use]
    pub fn image(&self) -> &EncodedImage {
        &self.image
    }
}

/// Chroma-keyed PNG with transparent background
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    image: EncodedImage,
    width: u32,
    height: u32,
}

impl ProcessedImage {
    #[must_use]
    pub fn new(image: EncodedImage, width: u32, height: u32) -> Self {
        Self {
            image,
            width,
            height,
        }
    }

    #[must_use]
    pub fn image(&self) -> &EncodedImage {
        &self.image
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_buffer_length_invariant() {
        assert!(PixelBuffer::new(2, 2, vec![0; 16]).is_ok());

        let err = PixelBuffer::new(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, StickerError::InvalidBuffer(_)));
        assert!(err.to_string().contains("needs 16 bytes, got 15"));
    }

    #[test]
    fn test_pixel_buffer_zero_sized_rejected() {
        for (width, height) in [(0, 0), (3, 0), (0, 5)] {
            let err = PixelBuffer::new(width, height, Vec::new()).unwrap_err();
            assert!(matches!(err, StickerError::InvalidBuffer(_)));
            assert!(PixelBuffer::filled(width, height, [0, 0, 0, 255]).is_err());
        }
    }

    #[test]
    fn test_pixel_access() {
        let mut buffer = PixelBuffer::filled(3, 2, [1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.as_raw().len(), 24);
        assert_eq!(buffer.pixel(2, 1), Some([1, 2, 3, 4]));
        assert_eq!(buffer.pixel(3, 0), None);

        assert!(buffer.set_pixel(1, 1, [9, 8, 7, 6]));
        assert!(!buffer.set_pixel(0, 2, [0, 0, 0, 0]));
        assert_eq!(buffer.pixel(1, 1), Some([9, 8, 7, 6]));
        // Row-major: (1, 1) in a 3-wide image is pixel index 4
        assert_eq!(&buffer.as_raw()[16..20], &[9, 8, 7, 6]);
    }

    #[test]
    fn test_rgba_image_conversion() {
        let mut image = RgbaImage::new(4, 3);
        image.put_pixel(3, 2, image::Rgba([10, 20, 30, 40]));

        let buffer = PixelBuffer::from(image.clone());
        assert_eq!(buffer.dimensions(), (4, 3));
        assert_eq!(buffer.pixel(3, 2), Some([10, 20, 30, 40]));
        assert_eq!(buffer.into_rgba_image().unwrap(), image);
    }

    #[test]
    fn test_data_uri_round_trip() {
        let image = EncodedImage::png(vec![0x89, b'P', b'N', b'G', 0, 1, 2]);
        let uri = image.to_data_uri();
        assert!(uri.starts_with("data:image/png;base64,"));

        let parsed = EncodedImage::from_data_uri(&uri).unwrap();
        assert_eq!(parsed, image);
    }

    #[test]
    fn test_data_uri_rejections() {
        assert!(EncodedImage::from_data_uri("image/png;base64,AAAA").is_err());
        assert!(EncodedImage::from_data_uri("data:image/png;base64").is_err());
        assert!(EncodedImage::from_data_uri("data:image/svg+xml,%3Csvg%3E").is_err());

        let err = EncodedImage::from_data_uri("data:image/png;base64,@@not-base64@@").unwrap_err();
        assert!(matches!(err, StickerError::Decode(_)));
    }

    #[test]
    fn test_encoded_image_debug_omits_bytes() {
        let image = EncodedImage::new(vec![7; 1024], "image/jpeg");
        let debug = format!("{:?}", image);
        assert!(debug.contains("image/jpeg"));
        assert!(debug.contains("1024"));
    }
}

//! Image codec service
//!
//! Converts between opaque image sources (user files, data URIs, service
//! output, remote URLs) and decoded [`PixelBuffer`]s, and encodes buffers
//! back to lossless PNG.

use crate::{
    error::{Result, StickerError},
    types::{EncodedImage, PixelBuffer},
};
use image::ImageFormat;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Anything the codec can resolve to encoded image bytes
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Raw encoded bytes of unknown format
    Bytes(Vec<u8>),
    /// An already-wrapped encoded image
    Encoded(EncodedImage),
    /// A local file
    Path(PathBuf),
    /// A `data:<mime>;base64,...` URI
    DataUri(String),
    /// An `http://` or `https://` URL
    Url(String),
}

impl ImageSource {
    /// Classify a string as a data URI, URL, or local path
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.starts_with("data:") {
            Self::DataUri(trimmed.to_string())
        } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else {
            Self::Path(PathBuf::from(trimmed))
        }
    }
}

impl From<EncodedImage> for ImageSource {
    fn from(image: EncodedImage) -> Self {
        Self::Encoded(image)
    }
}

/// Service for decoding and encoding images
pub struct ImageCodec;

impl ImageCodec {
    /// Resolve any [`ImageSource`] and decode it to RGBA8
    ///
    /// # Errors
    /// - `StickerError::Decode` when the source cannot be resolved (missing
    ///   file, malformed data URI, failed HTTP request) or parsed as an image
    ///
    /// # Examples
    /// ```rust,no_run
    /// use sticker_ai::services::{ImageCodec, ImageSource};
    ///
    /// # async fn example() -> sticker_ai::Result<()> {
    /// let pixels = ImageCodec::decode(ImageSource::parse("generated.png")).await?;
    /// println!("{}x{}", pixels.width(), pixels.height());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn decode(source: ImageSource) -> Result<PixelBuffer> {
        let bytes = Self::resolve(source).await?;
        Self::decode_bytes(&bytes)
    }

    /// Resolve a source to its raw encoded bytes without decoding
    ///
    /// # Errors
    /// - `StickerError::Decode` on any resolution failure
    pub async fn resolve(source: ImageSource) -> Result<Vec<u8>> {
        match source {
            ImageSource::Bytes(bytes) => Ok(bytes),
            ImageSource::Encoded(image) => Ok(image.bytes().to_vec()),
            ImageSource::DataUri(uri) => Ok(EncodedImage::from_data_uri(&uri)?.bytes().to_vec()),
            ImageSource::Path(path) => tokio::fs::read(&path).await.map_err(|e| {
                StickerError::decode(format!("failed to load '{}': {}", path.display(), e))
            }),
            ImageSource::Url(url) => Self::fetch(&url).await,
        }
    }

    /// Fetch a remote image; the client lives only for this call
    async fn fetch(url: &str) -> Result<Vec<u8>> {
        log::debug!("Fetching remote image {}", url);
        let client = reqwest::Client::new();
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| StickerError::decode(format!("failed to fetch '{}': {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StickerError::decode(format!(
                "failed to fetch '{}': HTTP {}",
                url, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StickerError::decode(format!("failed to read body of '{}': {}", url, e)))?;
        Ok(bytes.to_vec())
    }

    /// Decode encoded bytes to RGBA8
    ///
    /// # Errors
    /// - `StickerError::Decode` for empty, corrupt, or unsupported data
    pub fn decode_bytes(bytes: &[u8]) -> Result<PixelBuffer> {
        if bytes.is_empty() {
            return Err(StickerError::decode("image data is empty"));
        }

        let image = image::load_from_memory(bytes).map_err(|e| {
            StickerError::decode(format!(
                "failed to decode image from {} bytes: {}",
                bytes.len(),
                e
            ))
        })?;
        Ok(PixelBuffer::from(image.to_rgba8()))
    }

    /// Encode a pixel buffer as PNG, preserving alpha exactly
    ///
    /// `PixelBuffer` never has a zero dimension, so any buffer it accepts encodes.
    ///
    /// # Errors
    /// - `StickerError::Encode` if the PNG encoder fails
    pub fn encode_png(buffer: PixelBuffer) -> Result<EncodedImage> {
        let (width, height) = buffer.dimensions();
        let rgba = buffer.into_rgba_image()?;

        let mut bytes = Vec::new();
        rgba.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| {
                StickerError::encode(format!("failed to encode {}x{} PNG: {}", width, height, e))
            })?;
        Ok(EncodedImage::png(bytes))
    }

    /// Read a user-provided file into the canonical encoded representation
    ///
    /// The MIME type is sniffed from content, not from the file extension.
    ///
    /// # Errors
    /// - `StickerError::Read` if the file cannot be read or is not an image
    pub async fn to_portable<P: AsRef<Path>>(path: P) -> Result<EncodedImage> {
        let path_ref = path.as_ref();
        let bytes = tokio::fs::read(path_ref).await.map_err(|e| {
            StickerError::read(format!("failed to read '{}': {}", path_ref.display(), e))
        })?;

        let mime_type = Self::sniff_mime(&bytes).ok_or_else(|| {
            StickerError::read(format!(
                "'{}' is not a recognized image ({} bytes)",
                path_ref.display(),
                bytes.len()
            ))
        })?;

        log::debug!(
            "Read {} ({}, {} bytes)",
            path_ref.display(),
            mime_type,
            bytes.len()
        );
        Ok(EncodedImage::new(bytes, mime_type))
    }

    /// Guess the MIME type of encoded bytes from their magic number
    #[must_use]
    pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
        image::guess_format(bytes).ok().map(|format| format.to_mime_type())
    }

    /// Read image dimensions from the header without decoding pixels
    ///
    /// # Errors
    /// - `StickerError::Decode` if the format is unknown or the header is invalid
    pub fn dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
        image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| StickerError::decode(format!("failed to inspect image: {}", e)))?
            .into_dimensions()
            .map_err(|e| StickerError::decode(format!("failed to read image dimensions: {}", e)))
    }

    /// Check if a file path has a supported input image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp"
                )
            })
    }
}

#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # sticker-ai
//!
//! Turns a photo into a transparent sticker in two stages: an external
//! image-to-image model redraws the subject over a flat green background,
//! then a local chroma key makes that background transparent.
//!
//! ## Features
//!
//! - **Pipeline orchestration**: observable state machine with stale-run protection
//! - **Chroma key**: deterministic per-pixel green-screen removal
//! - **Gemini adapter**: `generateContent` client behind the [`GenerationService`] trait
//! - **Codec**: JPEG, PNG and WebP input; lossless PNG output with alpha
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sticker_ai::{
//!     GeminiConfig, GeminiGenerator, ImageCodec, PipelineConfig, SourceImage, StickerPipeline,
//!     StickerWriter,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let generator = Arc::new(GeminiGenerator::new(GeminiConfig::from_env()?)?);
//! let pipeline = StickerPipeline::new(generator, PipelineConfig::default())?;
//!
//! let source = SourceImage::from_encoded(ImageCodec::to_portable("cat.jpg").await?)?;
//! let snapshot = pipeline.run_to_completion(source).await?;
//!
//! if let Some(sticker) = snapshot.state.deliverable() {
//!     StickerWriter::save_in_dir(sticker, ".")?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, spinners and subscriber setup
//! - `webp-support` (default): WebP input
//! - `tracing-json`: JSON log output for the CLI

pub mod chroma_key;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod pipeline;
pub mod services;
pub mod tracing_config;
pub mod types;

// Public API exports
pub use chroma_key::{
    is_key_color, ChromaKeySegmenter, KEY_BRIGHTNESS_FLOOR, KEY_DIFFERENCE_THRESHOLD,
};
pub use config::{PipelineConfig, PipelineConfigBuilder, MAX_STAGING_DELAY};
pub use error::{Result, StickerError};
pub use generation::{
    GeminiConfig, GeminiConfigBuilder, GeminiGenerator, GenerationService, MockGenerator,
    MockResponse, STICKER_PROMPT,
};
pub use pipeline::{
    PipelineSnapshot, PipelineState, PipelineStatus, RunHandle, RunId, StickerPipeline,
};
pub use services::{ImageCodec, ImageSource, StickerWriter, STICKER_FILE_PREFIX};
pub use types::{EncodedImage, GeneratedImage, PixelBuffer, ProcessedImage, SourceImage};

pub use tracing_config::{events, spans, TracingConfig, TracingFormat};
#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;

/// Key out the green background of an already generated image
///
/// Runs only the local stage of the pipeline: decode, chroma key, PNG encode.
///
/// # Examples
/// ```rust,no_run
/// use sticker_ai::{remove_green_screen, ImageCodec};
///
/// # async fn example() -> anyhow::Result<()> {
/// let generated = ImageCodec::to_portable("generated.png").await?;
/// let sticker = remove_green_screen(&generated)?;
/// std::fs::write("sticker.png", sticker.image().bytes())?;
/// # Ok(())
/// # }
/// ```
pub fn remove_green_screen(image: &EncodedImage) -> Result<ProcessedImage> {
    ChromaKeySegmenter::process_encoded(image)
}

/// Resolve any [`ImageSource`] and key out its green background
///
/// Accepts raw bytes, file paths, data URIs and `http(s)` URLs.
pub async fn remove_green_screen_from_source(source: ImageSource) -> Result<ProcessedImage> {
    let bytes = ImageCodec::resolve(source).await?;
    let mime_type = ImageCodec::sniff_mime(&bytes)
        .ok_or_else(|| StickerError::decode("source is not a recognized image"))?;
    let image = EncodedImage::new(bytes, mime_type);

    tokio::task::spawn_blocking(move || ChromaKeySegmenter::process_encoded(&image))
        .await
        .map_err(|e| StickerError::internal(format!("chroma key worker failed: {}", e)))?
}

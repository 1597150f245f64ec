//! Generation service boundary
//!
//! The generative model is an opaque, fallible, slow image-to-image service.
//! The pipeline only depends on [`GenerationService`]; adapters live in the
//! submodules.

pub mod gemini;
pub mod mock;

use crate::{error::Result, types::EncodedImage};
use async_trait::async_trait;

pub use gemini::{GeminiConfig, GeminiConfigBuilder, GeminiGenerator, STICKER_PROMPT};
pub use mock::{MockGenerator, MockResponse};

/// Image-to-image generation service producing a subject over a pure green background
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generate a sticker image for `source`
    ///
    /// May take several seconds. The output is expected to show the subject
    /// composited over a flat (0, 255, 0) background.
    ///
    /// # Errors
    /// - `StickerError::Generation` with a human-readable cause (quota, auth,
    ///   content policy, network). Causes are not distinguished further.
    async fn generate(&self, source: &EncodedImage) -> Result<EncodedImage>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

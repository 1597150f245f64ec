//! Gemini image generation adapter
//!
//! Sends the user's photo plus a sticker prompt to the Gemini
//! `generateContent` endpoint and returns the first inline image of the
//! response.

use super::GenerationService;
use crate::{
    error::{Result, StickerError},
    types::EncodedImage,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default image model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

/// Default API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Prompt asking for a die-cut sticker on the key color the segmenter removes
pub const STICKER_PROMPT: &str = "Turn the main subject of this photo into a die-cut sticker. \
Keep the subject recognizable, isolate it from its surroundings, and add a thick, clean white \
outline around its silhouette. Place the sticker on a solid, perfectly uniform pure green \
background (#00FF00, RGB 0,255,0) that fills the whole frame edge to edge. Do not use gradients, \
shadows, textures or any other green tones in the background, and avoid pure green inside the \
subject.";

/// Environment variables checked for the API key, in order
const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Configuration for the Gemini adapter
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key sent as `x-goog-api-key`
    #[serde(default, skip_serializing)]
    pub api_key: String,

    /// Model name, e.g. `gemini-2.5-flash-image`
    pub model: String,

    /// Base URL up to and including the API version
    pub endpoint: String,

    /// Instruction sent alongside the photo
    pub prompt: String,

    /// Whole-request timeout
    pub request_timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            prompt: STICKER_PROMPT.to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl GeminiConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> GeminiConfigBuilder {
        GeminiConfigBuilder::default()
    }

    /// Default configuration with the API key taken from the environment
    ///
    /// # Errors
    /// - Neither `GEMINI_API_KEY` nor `API_KEY` is set
    pub fn from_env() -> Result<Self> {
        let api_key = API_KEY_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                StickerError::invalid_config(format!(
                    "no API key found; set one of {}",
                    API_KEY_VARS.join(", ")
                ))
            })?;

        Self::builder().api_key(api_key).build()
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    /// - Empty API key, model, endpoint, or prompt
    /// - Zero request timeout
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(StickerError::invalid_config("Gemini API key is empty"));
        }
        if self.model.trim().is_empty() {
            return Err(StickerError::invalid_config("Gemini model name is empty"));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(StickerError::invalid_config(format!(
                "Gemini endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if self.prompt.trim().is_empty() {
            return Err(StickerError::invalid_config("generation prompt is empty"));
        }
        if self.request_timeout.is_zero() {
            return Err(StickerError::config_value_error(
                "request timeout (s)",
                0,
                "1+",
                Some(120),
            ));
        }
        Ok(())
    }

    /// Full `generateContent` URL for the configured model
    #[must_use]
    pub fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

/// Builder for `GeminiConfig`
#[derive(Debug, Default)]
pub struct GeminiConfigBuilder {
    config: GeminiConfig,
}

impl GeminiConfigBuilder {
    #[must_use]
    pub fn api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.config.api_key = api_key.into();
        self
    }

    #[must_use]
    pub fn model<S: Into<String>>(mut self, model: S) -> Self {
        self.config.model = model.into();
        self
    }

    #[must_use]
    pub fn endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.config.prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule in [`GeminiConfig::validate`]
    pub fn build(self) -> Result<GeminiConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: RequestGenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestPart<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<RequestInlineData<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestInlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestGenerationConfig {
    response_modalities: [&'static str; 2],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    inline_data: Option<ResponseInlineData>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseInlineData {
    #[serde(default)]
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Gemini-backed [`GenerationService`]
pub struct GeminiGenerator {
    client: Client,
    config: GeminiConfig,
}

impl GeminiGenerator {
    /// Create a generator from a validated configuration
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Failed to create HTTP client
    pub fn new(config: GeminiConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StickerError::internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn request_body(&self, source: &EncodedImage) -> Result<Vec<u8>> {
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart {
                        inline_data: Some(RequestInlineData {
                            mime_type: source.mime_type(),
                            data: STANDARD.encode(source.bytes()),
                        }),
                        text: None,
                    },
                    RequestPart {
                        inline_data: None,
                        text: Some(&self.config.prompt),
                    },
                ],
            }],
            generation_config: RequestGenerationConfig {
                response_modalities: ["TEXT", "IMAGE"],
            },
        };

        serde_json::to_vec(&request)
            .map_err(|e| StickerError::internal(format!("failed to serialize request: {}", e)))
    }

    /// Pull the first inline image out of a `generateContent` response body
    fn extract_image(body: &[u8]) -> Result<EncodedImage> {
        let response: GenerateContentResponse = serde_json::from_slice(body).map_err(|e| {
            StickerError::generation(format!("unreadable response from Gemini: {}", e))
        })?;

        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(StickerError::generation(format!(
                "request blocked by content policy ({})",
                reason
            )));
        }

        let mut texts = Vec::new();
        let mut finish_reason = None;
        for candidate in &response.candidates {
            if finish_reason.is_none() {
                finish_reason = candidate.finish_reason.as_deref();
            }
            let Some(content) = &candidate.content else {
                continue;
            };
            for part in &content.parts {
                if let Some(inline) = &part.inline_data {
                    let bytes = STANDARD.decode(inline.data.trim()).map_err(|e| {
                        StickerError::generation(format!("invalid image data from Gemini: {}", e))
                    })?;
                    let mime_type = inline.mime_type.as_deref().unwrap_or("image/png");
                    return Ok(EncodedImage::new(bytes, mime_type));
                }
                if let Some(text) = part.text.as_deref().filter(|t| !t.trim().is_empty()) {
                    texts.push(text.trim());
                }
            }
        }

        let detail = if texts.is_empty() {
            finish_reason.map_or_else(
                || "no candidates returned".to_string(),
                |reason| format!("finish reason {}", reason),
            )
        } else {
            texts.join(" ")
        };
        Err(StickerError::generation(format!(
            "Gemini returned no image: {}",
            detail
        )))
    }

    /// Best-effort human-readable message from an error response body
    fn error_message(body: &[u8]) -> String {
        serde_json::from_slice::<ApiErrorEnvelope>(body)
            .ok()
            .map(|envelope| envelope.error.message)
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
    }
}

#[async_trait]
impl GenerationService for GeminiGenerator {
    async fn generate(&self, source: &EncodedImage) -> Result<EncodedImage> {
        let url = self.config.generate_url();
        let body = self.request_body(source)?;

        tracing::debug!(
            model = %self.config.model,
            source_bytes = source.len(),
            "Sending generation request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StickerError::generation(format!(
                        "request timed out after {}s",
                        self.config.request_timeout.as_secs()
                    ))
                } else {
                    StickerError::generation(format!("request to Gemini failed: {}", e))
                }
            })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StickerError::generation(format!("failed to read Gemini response: {}", e)))?;

        if !status.is_success() {
            return Err(StickerError::generation_with_status(
                "Gemini",
                status.as_u16(),
                &Self::error_message(&bytes),
            ));
        }

        let image = Self::extract_image(&bytes)?;
        tracing::debug!(
            mime_type = %image.mime_type(),
            bytes = image.len(),
            "Generation response received"
        );
        Ok(image)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GeminiConfig {
        GeminiConfig::builder().api_key("test-key").build().unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = GeminiConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        // No key by default
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(GeminiConfig::builder().api_key("k").model("").build().is_err());
        assert!(GeminiConfig::builder().api_key("k").endpoint("ftp://x").build().is_err());
        assert!(GeminiConfig::builder().api_key("k").prompt("  ").build().is_err());
        assert!(GeminiConfig::builder()
            .api_key("k")
            .request_timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", test_config());
        assert!(!debug.contains("test-key"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_generate_url() {
        let config = GeminiConfig::builder()
            .api_key("k")
            .endpoint("https://example.test/v1beta/")
            .model("image-model")
            .build()
            .unwrap();
        assert_eq!(
            config.generate_url(),
            "https://example.test/v1beta/models/image-model:generateContent"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let generator = GeminiGenerator::new(test_config()).unwrap();
        let source = EncodedImage::new(vec![1, 2, 3], "image/jpeg");

        let body = generator.request_body(&source).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], STANDARD.encode([1u8, 2, 3]));
        assert!(parts[0].get("text").is_none());
        assert_eq!(parts[1]["text"], STICKER_PROMPT);
        assert_eq!(json["generationConfig"]["responseModalities"][1], "IMAGE");
    }

    #[test]
    fn test_extract_image() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "Here is your sticker"},
                    {"inlineData": {"mimeType": "image/png", "data": STANDARD.encode([9u8, 8, 7])}}
                ]},
                "finishReason": "STOP"
            }]
        });

        let image = GeminiGenerator::extract_image(body.to_string().as_bytes()).unwrap();
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.bytes(), &[9, 8, 7]);
    }

    #[test]
    fn test_extract_image_text_only() {
        let body = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "I can't help with that."}]}}]
        });

        let err = GeminiGenerator::extract_image(body.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, StickerError::Generation(_)));
        assert!(err.to_string().contains("I can't help with that."));
    }

    #[test]
    fn test_extract_image_blocked() {
        let body = serde_json::json!({"promptFeedback": {"blockReason": "SAFETY"}});

        let err = GeminiGenerator::extract_image(body.to_string().as_bytes()).unwrap_err();
        assert!(err.to_string().contains("content policy"));
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_extract_image_empty_candidates() {
        let err = GeminiGenerator::extract_image(b"{}").unwrap_err();
        assert!(err.to_string().contains("no candidates"));

        assert!(GeminiGenerator::extract_image(b"not json").is_err());
    }

    #[test]
    fn test_error_message() {
        let body = br#"{"error": {"code": 429, "message": "quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(GeminiGenerator::error_message(body), "quota exceeded");
        assert_eq!(GeminiGenerator::error_message(b"Bad Gateway\n"), "Bad Gateway");
    }
}

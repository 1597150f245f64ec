//! Error types for sticker generation operations

use thiserror::Error;

/// Result type alias for sticker generation operations
pub type Result<T> = std::result::Result<T, StickerError>;

/// Error types for every stage of the sticker pipeline
#[derive(Error, Debug)]
pub enum StickerError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A user-provided file could not be read into a portable image
    #[error("Read error: {0}")]
    Read(String),

    /// An image source could not be resolved or parsed
    #[error("Decode error: {0}")]
    Decode(String),

    /// A pixel buffer could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// The external generation service failed or timed out
    #[error("Generation failed: {0}")]
    Generation(String),

    /// A pixel buffer whose length does not match its dimensions
    #[error("Invalid pixel buffer: {0}")]
    InvalidBuffer(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An operation was requested in a pipeline state that does not allow it
    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StickerError {
    /// Create a new read error
    pub fn read<S: Into<String>>(msg: S) -> Self {
        Self::Read(msg.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a new generation error
    pub fn generation<S: Into<String>>(msg: S) -> Self {
        Self::Generation(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// The underlying message without the variant prefix that `Display` adds
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Io(e) => e.to_string(),
            Self::Read(msg)
            | Self::Decode(msg)
            | Self::Encode(msg)
            | Self::Generation(msg)
            | Self::InvalidBuffer(msg)
            | Self::InvalidConfig(msg)
            | Self::InvalidState(msg)
            | Self::Internal(msg) => msg.clone(),
        }
    }

    /// Whether this error came from the decode/encode boundary around segmentation.
    ///
    /// The orchestrator downgrades these to an advisory on an otherwise completed run.
    #[must_use]
    pub fn is_segmentation_boundary(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Encode(_) | Self::Internal(_))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create generation error carrying the HTTP status reported by the service
    pub fn generation_with_status(service: &str, status: u16, message: &str) -> Self {
        Self::Generation(format!("{} responded with HTTP {}: {}", service, status, message))
    }
}

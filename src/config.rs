//! Configuration types for the sticker pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest accepted staging delay
pub const MAX_STAGING_DELAY: Duration = Duration::from_secs(10);

/// Configuration for pipeline runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pause between the generation-complete transition and segmentation
    ///
    /// Purely cosmetic: gives observers a chance to render the intermediate
    /// "generated, now processing" state before the fast segmentation step
    /// completes. Zero disables it.
    pub staging_delay: Duration,

    /// Upper bound on a single generation call (`None` = wait indefinitely)
    pub generation_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            staging_delay: Duration::from_millis(500),
            generation_timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use std::time::Duration;
    /// use sticker_ai::PipelineConfig;
    ///
    /// let config = PipelineConfig::builder()
    ///     .staging_delay(Duration::ZERO)
    ///     .generation_timeout(Some(Duration::from_secs(30)))
    ///     .build()
    ///     .unwrap();
    /// assert!(config.staging_delay.is_zero());
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Staging delay above [`MAX_STAGING_DELAY`]
    /// - Zero generation timeout (use `None` to disable the timeout)
    pub fn validate(&self) -> crate::Result<()> {
        if self.staging_delay > MAX_STAGING_DELAY {
            return Err(crate::error::StickerError::config_value_error(
                "staging delay (ms)",
                self.staging_delay.as_millis(),
                "0-10000",
                Some(500),
            ));
        }

        if self.generation_timeout.is_some_and(|t| t.is_zero()) {
            return Err(crate::error::StickerError::invalid_config(
                "generation timeout must be positive; use None to disable it",
            ));
        }

        Ok(())
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the cosmetic delay before segmentation
    #[must_use]
    pub fn staging_delay(mut self, delay: Duration) -> Self {
        self.config.staging_delay = delay;
        self
    }

    /// Set the generation timeout
    #[must_use]
    pub fn generation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.generation_timeout = timeout;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule in [`PipelineConfig::validate`]
    pub fn build(self) -> crate::Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//! Conversion of CLI arguments into library configuration

use crate::cli::main_impl::GenerateArgs;
use crate::{config::PipelineConfig, generation::GeminiConfig};
use anyhow::{Context, Result};
use std::time::Duration;

/// Convert CLI arguments to `PipelineConfig` and `GeminiConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the pipeline configuration; `--timeout-secs 0` disables the timeout
    pub(crate) fn pipeline_config(args: &GenerateArgs) -> Result<PipelineConfig> {
        let timeout = (args.timeout_secs > 0).then(|| Duration::from_secs(args.timeout_secs));

        PipelineConfig::builder()
            .staging_delay(Duration::from_millis(args.delay_ms))
            .generation_timeout(timeout)
            .build()
            .context("Failed to build pipeline configuration")
    }

    /// Build the Gemini configuration from the environment plus `--model`
    pub(crate) fn gemini_config(args: &GenerateArgs) -> Result<GeminiConfig> {
        let mut config =
            GeminiConfig::from_env().context("Set GEMINI_API_KEY to use `generate`")?;

        if let Some(model) = &args.model {
            config.model.clone_from(model);
            config.validate()?;
        }

        Ok(config)
    }
}

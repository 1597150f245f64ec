//! Sticker CLI tool
//!
//! Command-line front end for the sticker pipeline: `generate` runs the full
//! two-stage pipeline against Gemini, `key` only applies the chroma key to
//! images that were generated elsewhere.

use super::config::CliConfigBuilder;
use crate::{
    chroma_key::ChromaKeySegmenter,
    error::StickerError,
    generation::{GenerationService, GeminiGenerator},
    pipeline::{PipelineSnapshot, PipelineState, StickerPipeline},
    services::{ImageCodec, ImageSource, StickerWriter},
    tracing_config::{events, init_cli_tracing, spans},
    types::{EncodedImage, SourceImage},
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Turn photos into transparent stickers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "sticker-ai")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a sticker from a photo (requires GEMINI_API_KEY)
    Generate(GenerateArgs),
    /// Remove the green background from already generated images
    Key(KeyArgs),
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Photo to turn into a sticker: a file path, data URI, or http(s) URL
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Output file [default: sticker-ai-<unix-millis>.png in the current directory]
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Gemini model name
    #[arg(short, long)]
    pub model: Option<String>,

    /// Pause before background removal, in milliseconds (0 disables)
    #[arg(long, default_value_t = 500)]
    pub delay_ms: u64,

    /// Generation timeout in seconds (0 waits indefinitely)
    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// Generated images with a green background
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<PathBuf>,

    /// Output directory [default: next to each input]
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;
    log::debug!("Session {}", session_id);

    match cli.command {
        Command::Generate(args) => generate(&args).await,
        Command::Key(args) => key(&args).await,
    }
}

async fn generate(args: &GenerateArgs) -> Result<()> {
    let pipeline_config =
        CliConfigBuilder::pipeline_config(args).context("Invalid pipeline options")?;
    let gemini_config =
        CliConfigBuilder::gemini_config(args).context("Invalid generation options")?;

    info!("Model: {}", gemini_config.model);
    let generator: Arc<dyn GenerationService> =
        Arc::new(GeminiGenerator::new(gemini_config).context("Failed to create Gemini client")?);
    let pipeline = StickerPipeline::new(generator, pipeline_config)?;

    let source = load_source(&args.input)
        .await
        .with_context(|| format!("Failed to load {}", args.input))?;
    let (width, height) = source.dimensions();
    info!("Input: {} ({}x{})", args.input, width, height);

    let start = Instant::now();
    let snapshot = follow_run(&pipeline, source).await?;

    match &snapshot.state {
        PipelineState::Completed { advisory, .. } => {
            if let Some(advisory) = advisory {
                events::warning_with_recommendation(
                    advisory,
                    "the saved image keeps its background; retry with `sticker-ai key`",
                );
            }

            let image = snapshot
                .state
                .deliverable()
                .context("Completed run has no image")?;
            let path = save_deliverable(image, args.output.as_deref())?;

            info!(
                "Sticker saved to {} in {:.2}s",
                path.display(),
                start.elapsed().as_secs_f64()
            );
            println!("{}", path.display());
            Ok(())
        },
        PipelineState::Failed { error, .. } => {
            anyhow::bail!("Sticker generation failed: {}", error)
        },
        other => anyhow::bail!("Run ended while {}", other.status().description()),
    }
}

/// Submit `source` and show a spinner until the run ends
async fn follow_run(pipeline: &StickerPipeline, source: SourceImage) -> Result<PipelineSnapshot> {
    let mut updates = pipeline.subscribe();
    let handle = pipeline.submit(source)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    let snapshot = loop {
        let snapshot = updates.borrow_and_update().clone();
        let status = snapshot.status();
        spinner.set_message(format!(
            "{} ({}%)",
            status.description(),
            status.progress_percentage()
        ));

        if snapshot.run != handle.id() || status.is_terminal() {
            break snapshot;
        }
        if updates.changed().await.is_err() {
            break pipeline.snapshot();
        }
    };

    handle.join().await?;
    spinner.finish_and_clear();
    Ok(snapshot)
}

/// Read the photo from a path, data URI or URL
async fn load_source(input: &str) -> crate::Result<SourceImage> {
    let image = match ImageSource::parse(input) {
        ImageSource::Path(path) => ImageCodec::to_portable(path).await?,
        other => {
            let bytes = ImageCodec::resolve(other).await?;
            let mime_type = ImageCodec::sniff_mime(&bytes)
                .ok_or_else(|| StickerError::read("input is not a recognized image"))?;
            EncodedImage::new(bytes, mime_type)
        },
    };
    SourceImage::from_encoded(image)
}

fn save_deliverable(image: &EncodedImage, output: Option<&Path>) -> crate::Result<PathBuf> {
    match output {
        Some(path) => {
            StickerWriter::save(image, path)?;
            Ok(path.to_path_buf())
        },
        None => StickerWriter::save_in_dir(image, "."),
    }
}

async fn key(args: &KeyArgs) -> Result<()> {
    let mut files = Vec::new();
    for input in &args.input {
        if !input.is_file() {
            anyhow::bail!(
                "Input path does not exist or is not a file: {}",
                input.display()
            );
        }
        if ImageCodec::is_supported_format(input) {
            files.push(input.clone());
        } else {
            warn!("Skipping unsupported file: {}", input.display());
        }
    }

    if files.is_empty() {
        anyhow::bail!("No supported images (jpg, jpeg, png, webp) in the provided inputs");
    }

    let progress = if files.len() > 1 {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let start = Instant::now();
    let mut processed_count = 0;
    let mut failed_count = 0;

    for input in &files {
        if let Some(pb) = &progress {
            pb.set_message(input.display().to_string());
        }

        let output_path = key_output_path(input, args.output.as_deref());
        let outcome = key_file(input, &output_path)
            .instrument(spans::file_processing(input))
            .await;
        match outcome {
            Ok(()) => {
                processed_count += 1;
                info!("{} -> {}", input.display(), output_path.display());
            },
            Err(e) => {
                failed_count += 1;
                events::error_with_context(&e, &input.display().to_string());
            },
        }

        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message(format!(
            "Processed: {processed_count}, Failed: {failed_count}"
        ));
    }
    events::performance_metric("key_batch", start.elapsed().as_millis() as u64);

    if failed_count > 0 {
        error!("{} of {} file(s) failed", failed_count, files.len());
        anyhow::bail!("Some files failed to process");
    }
    Ok(())
}

async fn key_file(input: &Path, output: &Path) -> crate::Result<()> {
    let image = ImageCodec::to_portable(input).await?;
    let processed = tokio::task::spawn_blocking(move || ChromaKeySegmenter::process_encoded(&image))
        .await
        .map_err(|e| StickerError::internal(format!("chroma key worker failed: {}", e)))??;
    StickerWriter::save(processed.image(), output)
}

/// `<dir>/<stem>-sticker.png`, next to the input unless a directory is given
fn key_output_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let dir = output_dir
        .or_else(|| input.parent())
        .unwrap_or_else(|| Path::new("."));
    dir.join(StickerWriter::derived_file_name(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelBuffer;
    use clap::CommandFactory;
    use tempfile::TempDir;

    fn green_png() -> EncodedImage {
        let mut buffer = PixelBuffer::filled(3, 3, [0, 255, 0, 255]).unwrap();
        buffer.set_pixel(1, 1, [200, 100, 50, 255]);
        ImageCodec::encode_png(buffer).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_generate() {
        let cli = Cli::try_parse_from([
            "sticker-ai",
            "-v",
            "generate",
            "cat.jpg",
            "-o",
            "out/cat.png",
            "--delay-ms",
            "0",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Generate(args) => {
                assert_eq!(args.input, "cat.jpg");
                assert_eq!(args.output, Some(PathBuf::from("out/cat.png")));
                assert_eq!(args.delay_ms, 0);
                assert_eq!(args.timeout_secs, 120);
                assert!(args.model.is_none());
            },
            Command::Key(_) => panic!("expected generate"),
        }
    }

    #[test]
    fn test_parse_key_requires_input() {
        assert!(Cli::try_parse_from(["sticker-ai", "key"]).is_err());

        let cli = Cli::try_parse_from(["sticker-ai", "key", "a.png", "b.png", "-o", "out"]).unwrap();
        match cli.command {
            Command::Key(args) => {
                assert_eq!(args.input.len(), 2);
                assert_eq!(args.output, Some(PathBuf::from("out")));
            },
            Command::Generate(_) => panic!("expected key"),
        }
    }

    #[test]
    fn test_key_output_path() {
        assert_eq!(
            key_output_path(Path::new("photos/cat.png"), None),
            PathBuf::from("photos/cat-sticker.png")
        );
        assert_eq!(
            key_output_path(Path::new("photos/cat.png"), Some(Path::new("out"))),
            PathBuf::from("out/cat-sticker.png")
        );
        assert_eq!(
            key_output_path(Path::new("cat.webp"), None),
            PathBuf::from("cat-sticker.png")
        );
    }

    #[tokio::test]
    async fn test_key_file_writes_transparent_png() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("generated.png");
        std::fs::write(&input, green_png().bytes()).unwrap();
        let output = temp_dir.path().join("out").join("generated-sticker.png");

        key_file(&input, &output).await.unwrap();

        let buffer = ImageCodec::decode_bytes(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!(buffer.pixel(0, 0).unwrap()[3], 0);
        assert_eq!(buffer.pixel(1, 1), Some([200, 100, 50, 255]));
    }

    #[tokio::test]
    async fn test_key_file_rejects_non_image() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("notes.png");
        std::fs::write(&input, b"not an image").unwrap();

        let err = key_file(&input, &temp_dir.path().join("x.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, StickerError::Read(_)));
    }

    #[tokio::test]
    async fn test_load_source_from_data_uri() {
        let uri = green_png().to_data_uri();
        let source = load_source(&uri).await.unwrap();
        assert_eq!(source.dimensions(), (3, 3));
        assert_eq!(source.image().mime_type(), "image/png");
    }
}

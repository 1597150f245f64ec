//! Sticker pipeline orchestrator
//!
//! Sequences one run as:
//!
//! ```text
//! Idle ──submit──► Generating ──ok──► Segmenting ──ok──► Completed
//!                      │                   └──decode/encode error──► Completed (advisory)
//!                      └──error/timeout──► Failed
//! any ──reset──► Idle
//! ```
//!
//! The pipeline is the only writer of [`PipelineSnapshot`]; observers read
//! clones or subscribe to a `watch` channel. Every run carries a [`RunId`]
//! and a spawned run only applies a transition while its id is still the
//! current one, so results of runs superseded by `reset` are dropped.

use crate::{
    chroma_key::ChromaKeySegmenter,
    config::PipelineConfig,
    error::{Result, StickerError},
    generation::GenerationService,
    tracing_config::spans,
    types::{EncodedImage, GeneratedImage, ProcessedImage, SourceImage},
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn, Instrument};

/// Identifier of one pipeline run; reset and submit each allocate a new one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

impl RunId {
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Pipeline state without attached artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Waiting for a source image
    Idle,
    /// Generation service call in flight
    Generating,
    /// Generated image received, chroma key pending
    Segmenting,
    /// Run finished with a deliverable
    Completed,
    /// Generation failed; resubmit to retry
    Failed,
}

impl PipelineStatus {
    /// Human-readable description for display
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Idle => "Waiting for a photo",
            Self::Generating => "Generating sticker",
            Self::Segmenting => "Removing background",
            Self::Completed => "Sticker ready",
            Self::Failed => "Generation failed",
        }
    }

    /// Typical progress percentage for this status
    #[must_use]
    pub fn progress_percentage(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Generating => 30,
            Self::Segmenting => 90,
            Self::Completed | Self::Failed => 100,
        }
    }

    /// Whether the run has ended
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a run is in flight
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Generating | Self::Segmenting)
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Pipeline state with the artifacts each state owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Generating {
        source: SourceImage,
    },
    Segmenting {
        source: SourceImage,
        generated: GeneratedImage,
    },
    Completed {
        source: SourceImage,
        generated: GeneratedImage,
        /// `None` when post-processing failed and the generated image is delivered instead
        processed: Option<ProcessedImage>,
        /// Non-fatal message for degraded runs
        advisory: Option<String>,
    },
    Failed {
        source: SourceImage,
        error: String,
    },
}

impl PipelineState {
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        match self {
            Self::Idle => PipelineStatus::Idle,
            Self::Generating { .. } => PipelineStatus::Generating,
            Self::Segmenting { .. } => PipelineStatus::Segmenting,
            Self::Completed { .. } => PipelineStatus::Completed,
            Self::Failed { .. } => PipelineStatus::Failed,
        }
    }

    #[must_use]
    pub fn source(&self) -> Option<&SourceImage> {
        match self {
            Self::Idle => None,
            Self::Generating { source }
            | Self::Segmenting { source, .. }
            | Self::Completed { source, .. }
            | Self::Failed { source, .. } => Some(source),
        }
    }

    #[must_use]
    pub fn generated(&self) -> Option<&GeneratedImage> {
        match self {
            Self::Segmenting { generated, .. } | Self::Completed { generated, .. } => {
                Some(generated)
            },
            _ => None,
        }
    }

    #[must_use]
    pub fn processed(&self) -> Option<&ProcessedImage> {
        match self {
            Self::Completed { processed, .. } => processed.as_ref(),
            _ => None,
        }
    }

    /// Failure message, or the advisory of a degraded completion
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error, .. } => Some(error),
            Self::Completed { advisory, .. } => advisory.as_deref(),
            _ => None,
        }
    }

    /// The image to hand to the user: the processed sticker, or the
    /// generated image when post-processing failed
    #[must_use]
    pub fn deliverable(&self) -> Option<&EncodedImage> {
        match self {
            Self::Completed {
                processed: Some(processed),
                ..
            } => Some(processed.image()),
            Self::Completed { generated, .. } => Some(generated.image()),
            _ => None,
        }
    }
}

/// What observers see: the current run and its state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSnapshot {
    pub run: RunId,
    pub state: PipelineState,
}

impl PipelineSnapshot {
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        self.state.status()
    }
}

/// Handle to a spawned run
#[derive(Debug)]
pub struct RunHandle {
    id: RunId,
    task: JoinHandle<()>,
}

impl RunHandle {
    #[must_use]
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Wait until the run's task has finished, including a discarded stale result
    ///
    /// # Errors
    /// - The run task panicked
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| StickerError::internal(format!("{} task failed: {}", self.id, e)))
    }
}

/// Two-stage sticker pipeline: external generation, then local chroma key
pub struct StickerPipeline {
    generator: Arc<dyn GenerationService>,
    config: PipelineConfig,
    state: Arc<watch::Sender<PipelineSnapshot>>,
    next_run: AtomicU64,
}

impl StickerPipeline {
    /// Create an idle pipeline
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(generator: Arc<dyn GenerationService>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let (state, _) = watch::channel(PipelineSnapshot {
            run: RunId(0),
            state: PipelineState::Idle,
        });

        Ok(Self {
            generator,
            config,
            state: Arc::new(state),
            next_run: AtomicU64::new(1),
        })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Clone of the current snapshot
    #[must_use]
    pub fn snapshot(&self) -> PipelineSnapshot {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        self.state.borrow().status()
    }

    /// Receiver notified on every applied transition
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.state.subscribe()
    }

    fn allocate_run(&self) -> RunId {
        RunId(self.next_run.fetch_add(1, Ordering::Relaxed))
    }

    /// Start a run for `source`
    ///
    /// Only legal from `Idle`; call [`reset`](Self::reset) after a finished
    /// run. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// - `StickerError::InvalidState` if the pipeline is not idle
    pub fn submit(&self, source: SourceImage) -> Result<RunHandle> {
        let run = self.allocate_run();
        let mut rejected = None;

        self.state.send_if_modified(|snapshot| {
            let status = snapshot.status();
            if status != PipelineStatus::Idle {
                rejected = Some(status);
                return false;
            }
            *snapshot = PipelineSnapshot {
                run,
                state: PipelineState::Generating {
                    source: source.clone(),
                },
            };
            true
        });

        if let Some(status) = rejected {
            return Err(StickerError::invalid_state(format!(
                "cannot submit while {}; reset first",
                status.description().to_lowercase()
            )));
        }

        let (width, height) = source.dimensions();
        info!(
            %run,
            generator = %self.generator.name(),
            width,
            height,
            "Run submitted"
        );

        let task = RunTask {
            run,
            generator: Arc::clone(&self.generator),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
        };
        let span = spans::run(run, self.generator.name());
        let task = tokio::spawn(task.execute(source).instrument(span));

        Ok(RunHandle { id: run, task })
    }

    /// Submit and wait for the run to end
    ///
    /// # Errors
    /// - `StickerError::InvalidState` if the pipeline is not idle
    pub async fn run_to_completion(&self, source: SourceImage) -> Result<PipelineSnapshot> {
        let handle = self.submit(source)?;
        Ok(self.wait_for_terminal(handle.id()).await)
    }

    /// Resolve once `run` is Completed or Failed, or has been superseded
    pub async fn wait_for_terminal(&self, run: RunId) -> PipelineSnapshot {
        let mut rx = self.subscribe();
        let result = rx
            .wait_for(|snapshot| snapshot.run != run || snapshot.status().is_terminal())
            .await
            .map(|snapshot| snapshot.clone());

        // The sender lives as long as `self`, so the error arm is unreachable in practice
        result.unwrap_or_else(|_| self.snapshot())
    }

    /// Return to `Idle`, discarding all artifacts; in-flight results of the
    /// previous run will be ignored when they arrive
    pub fn reset(&self) {
        let run = self.allocate_run();
        let previous = self.state.send_replace(PipelineSnapshot {
            run,
            state: PipelineState::Idle,
        });

        info!(
            %run,
            previous_run = %previous.run,
            previous_status = ?previous.status(),
            "Pipeline reset"
        );
    }
}

/// Terminal state for a run whose segmentation step produced `outcome`.
///
/// Decode, encode and worker failures still deliver the generated image with an
/// advisory. Any other error fails the run.
fn segmentation_outcome(
    source: SourceImage,
    generated: GeneratedImage,
    outcome: Result<ProcessedImage>,
) -> PipelineState {
    match outcome {
        Ok(processed) => PipelineState::Completed {
            source,
            generated,
            processed: Some(processed),
            advisory: None,
        },
        Err(e) if e.is_segmentation_boundary() => {
            warn!(error = %e, "Background removal failed; delivering generated image");
            PipelineState::Completed {
                source,
                generated,
                processed: None,
                advisory: Some(format!(
                    "Background removal failed, but generation completed: {}",
                    e.message()
                )),
            }
        },
        Err(e) => {
            warn!(error = %e, "Segmentation failed");
            PipelineState::Failed {
                source,
                error: e.message(),
            }
        },
    }
}

/// Everything a spawned run needs, detached from the pipeline borrow
struct RunTask {
    run: RunId,
    generator: Arc<dyn GenerationService>,
    config: PipelineConfig,
    state: Arc<watch::Sender<PipelineSnapshot>>,
}

impl RunTask {
    async fn execute(self, source: SourceImage) {
        let start = instant::Instant::now();

        let generated = match self.generate(&source).await {
            Ok(image) => GeneratedImage::new(image),
            Err(e) => {
                warn!(error = %e, "Generation failed");
                self.transition(PipelineState::Failed {
                    source,
                    error: e.message(),
                });
                return;
            },
        };

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            bytes = generated.image().len(),
            "Generation completed"
        );

        let staged = self.transition(PipelineState::Segmenting {
            source: source.clone(),
            generated: generated.clone(),
        });
        if !staged {
            return;
        }

        if !self.config.staging_delay.is_zero() {
            tokio::time::sleep(self.config.staging_delay).await;
        }

        let outcome = Self::segment(generated.clone()).await;
        let next = segmentation_outcome(source, generated, outcome);

        if self.transition(next) {
            info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Run completed"
            );
        }
    }

    async fn generate(&self, source: &SourceImage) -> Result<EncodedImage> {
        let call = self
            .generator
            .generate(source.image())
            .instrument(spans::generation(self.generator.name()));

        match self.config.generation_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                StickerError::generation(format!("timed out after {:?}", limit))
            })?,
            None => call.await,
        }
    }

    /// Decode, key and encode on a blocking worker
    async fn segment(generated: GeneratedImage) -> Result<ProcessedImage> {
        let span = spans::segmentation(generated.image().len());
        tokio::task::spawn_blocking(move || {
            let _entered = span.entered();
            ChromaKeySegmenter::process_encoded(generated.image())
        })
        .await
        .map_err(|e| StickerError::internal(format!("segmentation worker failed: {}", e)))?
    }

    /// Apply `next` if this run is still current; returns whether it was applied
    fn transition(&self, next: PipelineState) -> bool {
        let run = self.run;
        let status = next.status();

        let applied = self.state.send_if_modified(|snapshot| {
            if snapshot.run != run {
                return false;
            }
            snapshot.state = next;
            true
        });

        if applied {
            debug!(%run, ?status, "State transition");
        } else {
            debug!(
                %run,
                current_run = %self.state.borrow().run,
                ?status,
                "Discarding result of superseded run"
            );
        }
        applied
    }
}

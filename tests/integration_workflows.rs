//! Integration tests for complete sticker pipeline runs
//!
//! Runs are driven by the scripted `MockGenerator`, so every scenario is
//! deterministic and needs no network access.

use std::sync::Arc;
use std::time::Duration;
use sticker_ai::{
    EncodedImage, GenerationService, ImageCodec, MockGenerator, MockResponse, PipelineConfig,
    PipelineState, PipelineStatus, PixelBuffer, SourceImage, StickerError, StickerPipeline,
};

const GREEN: [u8; 4] = [0, 255, 0, 255];
const RED: [u8; 4] = [255, 0, 0, 255];

fn encode(buffer: PixelBuffer) -> EncodedImage {
    ImageCodec::encode_png(buffer).expect("Failed to encode test image")
}

/// 10x10 opaque black photo
fn black_source() -> SourceImage {
    let buffer = PixelBuffer::filled(10, 10, [0, 0, 0, 255]).unwrap();
    SourceImage::from_encoded(encode(buffer)).unwrap()
}

fn white_source() -> SourceImage {
    let buffer = PixelBuffer::filled(6, 4, [255, 255, 255, 255]).unwrap();
    SourceImage::from_encoded(encode(buffer)).unwrap()
}

/// 10x10 image: left half key green, right half red
fn half_green_half_red() -> EncodedImage {
    let mut buffer = PixelBuffer::filled(10, 10, RED).unwrap();
    for y in 0..10 {
        for x in 0..5 {
            buffer.set_pixel(x, y, GREEN);
        }
    }
    encode(buffer)
}

fn solid(rgba: [u8; 4]) -> EncodedImage {
    encode(PixelBuffer::filled(4, 4, rgba).unwrap())
}

fn immediate_config() -> PipelineConfig {
    PipelineConfig::builder()
        .staging_delay(Duration::ZERO)
        .build()
        .unwrap()
}

fn create_pipeline(mock: &Arc<MockGenerator>) -> StickerPipeline {
    let generator: Arc<dyn GenerationService> = mock.clone();
    StickerPipeline::new(generator, immediate_config()).unwrap()
}

#[tokio::test]
async fn test_successful_run_keys_green_half() {
    let mock = Arc::new(MockGenerator::returning(half_green_half_red()));
    let pipeline = create_pipeline(&mock);
    let source = black_source();

    let snapshot = pipeline.run_to_completion(source.clone()).await.unwrap();

    let PipelineState::Completed {
        source: kept_source,
        generated,
        processed,
        advisory,
    } = &snapshot.state
    else {
        panic!("expected Completed, got {:?}", snapshot.status());
    };
    assert_eq!(kept_source, &source);
    assert_eq!(generated.image(), &half_green_half_red());
    assert!(advisory.is_none());

    let processed = processed.as_ref().expect("processed image");
    assert_eq!(processed.dimensions(), (10, 10));
    assert_eq!(processed.image().mime_type(), "image/png");

    let pixels = ImageCodec::decode_bytes(processed.image().bytes()).unwrap();
    for y in 0..10 {
        for x in 0..10 {
            let alpha = pixels.pixel(x, y).unwrap()[3];
            if x < 5 {
                assert_eq!(alpha, 0, "green pixel ({x}, {y}) should be transparent");
            } else {
                assert_eq!(alpha, 255, "red pixel ({x}, {y}) should stay opaque");
            }
        }
    }

    assert_eq!(snapshot.state.deliverable(), Some(processed.image()));
    assert_eq!(mock.call_history(), vec![source.image().clone()]);
}

#[tokio::test]
async fn test_generation_failure_moves_to_failed() {
    let mock = Arc::new(MockGenerator::failing("quota exceeded"));
    let pipeline = create_pipeline(&mock);

    let snapshot = pipeline.run_to_completion(black_source()).await.unwrap();

    assert_eq!(snapshot.status(), PipelineStatus::Failed);
    assert_eq!(snapshot.state.error(), Some("quota exceeded"));
    assert!(snapshot.state.generated().is_none());
    assert!(snapshot.state.processed().is_none());
    assert!(snapshot.state.deliverable().is_none());
    assert_eq!(snapshot.state.source(), Some(&black_source()));
}

#[tokio::test]
async fn test_retry_after_failure() {
    let mock = Arc::new(MockGenerator::failing("network unreachable"));
    mock.push(MockResponse::Image(solid(GREEN)));
    let pipeline = create_pipeline(&mock);

    let failed = pipeline.run_to_completion(black_source()).await.unwrap();
    assert_eq!(failed.status(), PipelineStatus::Failed);

    let err = pipeline.submit(black_source()).unwrap_err();
    assert!(matches!(err, StickerError::InvalidState(_)));

    pipeline.reset();
    let retried = pipeline.run_to_completion(black_source()).await.unwrap();
    assert_eq!(retried.status(), PipelineStatus::Completed);
    assert!(retried.run > failed.run);
    assert!(retried.state.error().is_none());
}

#[tokio::test]
async fn test_undecodable_generation_degrades_to_generated_image() {
    let garbage = EncodedImage::png(vec![0xde, 0xad, 0xbe, 0xef]);
    let mock = Arc::new(MockGenerator::returning(garbage.clone()));
    let pipeline = create_pipeline(&mock);

    let snapshot = pipeline.run_to_completion(black_source()).await.unwrap();

    assert_eq!(snapshot.status(), PipelineStatus::Completed);
    assert!(snapshot.state.processed().is_none());
    assert_eq!(snapshot.state.deliverable(), Some(&garbage));

    let advisory = snapshot.state.error().expect("advisory for degraded run");
    assert!(advisory.contains("Background removal failed"));
}

#[tokio::test]
async fn test_superseded_run_result_is_discarded() {
    let (first, first_tx) = MockResponse::deferred();
    let (second, second_tx) = MockResponse::deferred();
    let mock = Arc::new(MockGenerator::new([first, second]));
    let pipeline = create_pipeline(&mock);

    let run1 = pipeline.submit(black_source()).unwrap();
    mock.wait_for_calls(1).await;

    pipeline.reset();
    let run2 = pipeline.submit(white_source()).unwrap();
    let run2_id = run2.id();
    mock.wait_for_calls(2).await;

    // Run 1 resolves after run 2 has started
    first_tx.send(Ok(solid(RED))).unwrap();
    run1.join().await.unwrap();

    let snapshot = pipeline.snapshot();
    assert_eq!(snapshot.run, run2_id);
    assert_eq!(snapshot.status(), PipelineStatus::Generating);
    assert_eq!(snapshot.state.source(), Some(&white_source()));

    second_tx.send(Ok(half_green_half_red())).unwrap();
    let done = pipeline.wait_for_terminal(run2_id).await;
    run2.join().await.unwrap();

    assert_eq!(done.run, run2_id);
    assert_eq!(done.status(), PipelineStatus::Completed);
    assert_eq!(done.state.source(), Some(&white_source()));
    assert_eq!(
        done.state.generated().map(|g| g.image()),
        Some(&half_green_half_red())
    );
}

#[tokio::test]
async fn test_superseded_run_failure_is_discarded() {
    let (first, first_tx) = MockResponse::deferred();
    let mock = Arc::new(MockGenerator::new([first]));
    mock.push(MockResponse::Image(solid(GREEN)));
    let pipeline = create_pipeline(&mock);

    let run1 = pipeline.submit(black_source()).unwrap();
    mock.wait_for_calls(1).await;
    pipeline.reset();

    let completed = pipeline.run_to_completion(white_source()).await.unwrap();
    assert_eq!(completed.status(), PipelineStatus::Completed);

    first_tx.send(Err("quota exceeded".to_string())).unwrap();
    run1.join().await.unwrap();

    let snapshot = pipeline.snapshot();
    assert_eq!(snapshot, completed);
}

#[tokio::test]
async fn test_reset_during_generation_returns_to_idle() {
    let (response, tx) = MockResponse::deferred();
    let mock = Arc::new(MockGenerator::new([response]));
    let pipeline = create_pipeline(&mock);

    let run = pipeline.submit(black_source()).unwrap();
    mock.wait_for_calls(1).await;
    pipeline.reset();

    tx.send(Ok(solid(GREEN))).unwrap();
    run.join().await.unwrap();

    assert_eq!(pipeline.snapshot().state, PipelineState::Idle);
}

#[tokio::test]
async fn test_observers_see_every_stage() {
    let mock = Arc::new(MockGenerator::returning(solid(GREEN)));
    let pipeline = create_pipeline(&mock);
    let mut updates = pipeline.subscribe();

    let run = pipeline.submit(black_source()).unwrap();
    let mut seen = Vec::new();
    loop {
        updates.changed().await.unwrap();
        let status = updates.borrow_and_update().status();
        seen.push(status);
        if status.is_terminal() {
            break;
        }
    }
    run.join().await.unwrap();

    assert_eq!(seen.first(), Some(&PipelineStatus::Generating));
    assert_eq!(seen.last(), Some(&PipelineStatus::Completed));
    assert!(seen.windows(2).all(|w| w[0].progress_percentage() <= w[1].progress_percentage()));
}

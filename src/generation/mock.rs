//! Scriptable generation service for tests
//!
//! Responses are consumed in call order. `Deferred` responses let a test
//! decide exactly when a generation resolves, which is how superseded-run
//! behavior is exercised without timing assumptions.

use super::GenerationService;
use crate::{
    error::{Result, StickerError},
    types::EncodedImage,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// One scripted outcome of a `generate` call
#[derive(Debug)]
pub enum MockResponse {
    /// Resolve immediately with this image
    Image(EncodedImage),
    /// Reject immediately with this message
    Fail(String),
    /// Resolve when the paired sender fires; `Err` rejects with that message
    Deferred(oneshot::Receiver<std::result::Result<EncodedImage, String>>),
}

impl MockResponse {
    /// A deferred response and the sender that resolves it
    #[must_use]
    pub fn deferred() -> (
        Self,
        oneshot::Sender<std::result::Result<EncodedImage, String>>,
    ) {
        let (tx, rx) = oneshot::channel();
        (Self::Deferred(rx), tx)
    }
}

/// Mock generation service with a queue of scripted responses
#[derive(Debug, Default)]
pub struct MockGenerator {
    responses: Mutex<VecDeque<MockResponse>>,
    /// Source images seen, in call order
    call_history: Mutex<Vec<EncodedImage>>,
}

impl MockGenerator {
    /// Create a mock that answers calls with `responses` in order
    pub fn new<I: IntoIterator<Item = MockResponse>>(responses: I) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            call_history: Mutex::new(Vec::new()),
        }
    }

    /// A mock whose single call succeeds with `image`
    #[must_use]
    pub fn returning(image: EncodedImage) -> Self {
        Self::new([MockResponse::Image(image)])
    }

    /// A mock whose single call fails with `message`
    pub fn failing<S: Into<String>>(message: S) -> Self {
        Self::new([MockResponse::Fail(message.into())])
    }

    /// Queue another response
    pub fn push(&self, response: MockResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
    }

    /// Number of `generate` calls so far
    pub fn call_count(&self) -> usize {
        self.call_history.lock().map_or(0, |history| history.len())
    }

    /// Source images passed to `generate`, in call order
    pub fn call_history(&self) -> Vec<EncodedImage> {
        self.call_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    /// Yield to the runtime until at least `calls` generations have started
    pub async fn wait_for_calls(&self, calls: usize) {
        while self.call_count() < calls {
            tokio::task::yield_now().await;
        }
    }

    fn record_call(&self, source: &EncodedImage) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(source.clone());
        }
    }

    fn next_response(&self) -> Option<MockResponse> {
        self.responses.lock().ok()?.pop_front()
    }
}

#[async_trait]
impl GenerationService for MockGenerator {
    async fn generate(&self, source: &EncodedImage) -> Result<EncodedImage> {
        self.record_call(source);

        match self.next_response() {
            Some(MockResponse::Image(image)) => Ok(image),
            Some(MockResponse::Fail(message)) => Err(StickerError::generation(message)),
            Some(MockResponse::Deferred(rx)) => match rx.await {
                Ok(Ok(image)) => Ok(image),
                Ok(Err(message)) => Err(StickerError::generation(message)),
                Err(_) => Err(StickerError::generation("deferred response was dropped")),
            },
            None => Err(StickerError::generation("no scripted response left")),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

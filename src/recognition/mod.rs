//! Adapter over the OCR capability.
//!
//! Engines are synchronous and may be slow, so every call runs on a blocking
//! worker. Whatever the engine does, the caller sees exactly one
//! [`RecognitionResult`] per submission, or nothing if it was cancelled.

use std::any::Any;
use std::sync::Arc;

use color_eyre::Result;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};

use crate::capture::ImageReference;
use crate::format::{format, FormatPolicy};

pub mod ocr;

/// A run of words in reading order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextLine {
    pub words: Vec<String>,
}

/// Lines that belong together, e.g. a paragraph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBlock {
    pub lines: Vec<TextLine>,
}

/// Everything the engine found in one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredText {
    pub blocks: Vec<TextBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionResult {
    Success(String),
    Failure(String),
}

/// The OCR capability. Implementations may block.
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn recognize(&self, image: &ImageReference) -> Result<StructuredText>;
}

/// A recognition that has been started.
pub struct RecognitionTask {
    result: oneshot::Receiver<RecognitionResult>,
    abort: AbortHandle,
}

impl RecognitionTask {
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Waits for the result. `None` means the task was cancelled first.
    pub async fn outcome(self) -> Option<RecognitionResult> {
        self.result.await.ok()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

pub struct Recognizer {
    engine: Arc<dyn TextRecognizer>,
    policy: FormatPolicy,
}

impl Recognizer {
    pub fn new(engine: Arc<dyn TextRecognizer>, policy: FormatPolicy) -> Self {
        Self { engine, policy }
    }

    /// Starts recognizing `image` and returns without waiting.
    #[instrument(skip(self), fields(engine = self.engine.name()))]
    pub fn submit(&self, image: ImageReference) -> RecognitionTask {
        let (tx, rx) = oneshot::channel();
        let engine = Arc::clone(&self.engine);
        let policy = self.policy.clone();

        let handle = tokio::spawn(async move {
            debug!("recognizing {image}");
            let outcome = tokio::task::spawn_blocking(move || engine.recognize(&image)).await;
            let result = match outcome {
                Ok(Ok(structured)) => {
                    let text = format(&structured.blocks, &policy);
                    info!("recognized {} blocks", structured.blocks.len());
                    RecognitionResult::Success(text)
                }
                Ok(Err(e)) => {
                    warn!("recognition failed: {e:#}");
                    RecognitionResult::Failure(format!("{e:#}"))
                }
                Err(e) if e.is_panic() => {
                    let payload = e.into_panic();
                    let message = panic_message(payload.as_ref());
                    warn!("recognizer panicked: {message}");
                    RecognitionResult::Failure(format!("recognizer crashed: {message}"))
                }
                Err(e) => RecognitionResult::Failure(e.to_string()),
            };
            let _ = tx.send(result);
        });

        RecognitionTask {
            result: rx,
            abort: handle.abort_handle(),
        }
    }
}

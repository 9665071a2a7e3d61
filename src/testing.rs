//! In-process stand-ins for the platform collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;

use crate::capture::{Camera, ImagePicker, ImageReference, MimeFilter};
use crate::permission::{Capability, PermissionSystem};
use crate::recognition::{StructuredText, TextBlock, TextLine, TextRecognizer};

pub struct FakePermissions {
    pub existing: bool,
    pub answer: bool,
    pub requests: AtomicUsize,
}

impl FakePermissions {
    pub fn new(existing: bool, answer: bool) -> Arc<Self> {
        Arc::new(Self {
            existing,
            answer,
            requests: AtomicUsize::new(0),
        })
    }
}

#[async_trait(?Send)]
impl PermissionSystem for FakePermissions {
    fn has_grant(&self, _: Capability) -> bool {
        self.existing
    }

    async fn request_grant(&self, _: Capability) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

#[derive(Default)]
pub struct FakeCamera {
    preview_failure: Option<&'static str>,
    capture_failure: Option<&'static str>,
    pub previews: AtomicUsize,
    pub captures: AtomicUsize,
    pub unbinds: AtomicUsize,
}

impl FakeCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Binds fine but every capture fails with `message`.
    pub fn failing(message: &'static str) -> Arc<Self> {
        Arc::new(Self {
            capture_failure: Some(message),
            ..Self::default()
        })
    }

    /// The preview never starts.
    pub fn failing_preview(message: &'static str) -> Arc<Self> {
        Arc::new(Self {
            preview_failure: Some(message),
            ..Self::default()
        })
    }
}

#[async_trait]
impl Camera for FakeCamera {
    async fn start_preview(&self) -> Result<()> {
        self.previews.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.preview_failure {
            bail!(message);
        }
        Ok(())
    }

    async fn capture_still(&self, destination: &Utf8Path) -> Result<()> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.capture_failure {
            bail!(message);
        }
        tokio::fs::write(destination, b"not really a jpeg").await?;
        Ok(())
    }

    fn unbind_all(&self) {
        self.unbinds.fetch_add(1, Ordering::SeqCst);
    }
}

/// Answers every pick with the same path, or cancels when it has none.
pub struct FakePicker {
    answer: Option<Utf8PathBuf>,
}

impl FakePicker {
    pub fn new(answer: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.map(Utf8PathBuf::from),
        })
    }
}

#[async_trait]
impl ImagePicker for FakePicker {
    async fn pick_image(&self, _: &MimeFilter) -> Result<Option<Utf8PathBuf>> {
        Ok(self.answer.clone())
    }
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Text(StructuredText),
    Error(&'static str),
    Panic(&'static str),
}

impl Scripted {
    /// Blocks of lines of words.
    pub fn text(blocks: &[&[&[&str]]]) -> Self {
        let blocks = blocks
            .iter()
            .map(|lines| TextBlock {
                lines: lines
                    .iter()
                    .map(|words| TextLine {
                        words: words.iter().map(|w| w.to_string()).collect(),
                    })
                    .collect(),
            })
            .collect();
        Self::Text(StructuredText { blocks })
    }
}

/// Lets a gated recognition finish.
pub struct Release(mpsc::Sender<()>);

impl Release {
    pub fn release(&self) {
        let _ = self.0.send(());
    }
}

struct Script {
    outcome: Scripted,
    gate: Option<mpsc::Receiver<()>>,
}

/// Recognizer answering from a per-path script.
#[derive(Default)]
pub struct FakeRecognizer {
    scripts: Mutex<HashMap<Utf8PathBuf, Script>>,
    fallback: Option<Scripted>,
    pub started: AtomicUsize,
    /// Engine calls that got past their gate.
    pub finished: AtomicUsize,
}

impl FakeRecognizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn insert(self: Arc<Self>, path: &str, script: Script) -> Arc<Self> {
        self.scripts.lock().unwrap().insert(path.into(), script);
        self
    }

    pub fn with(self: Arc<Self>, path: &str, outcome: Scripted) -> Arc<Self> {
        self.insert(
            path,
            Script {
                outcome,
                gate: None,
            },
        )
    }

    /// The recognition of `path` blocks until the returned [`Release`] fires.
    pub fn gated(self: Arc<Self>, path: &str, outcome: Scripted) -> (Arc<Self>, Release) {
        let (tx, rx) = mpsc::channel();
        let this = self.insert(
            path,
            Script {
                outcome,
                gate: Some(rx),
            },
        );
        (this, Release(tx))
    }

    /// Answer for paths without a script of their own.
    pub fn otherwise(self: Arc<Self>, outcome: Scripted) -> Arc<Self> {
        let scripts = std::mem::take(&mut *self.scripts.lock().unwrap());
        Arc::new(Self {
            scripts: Mutex::new(scripts),
            fallback: Some(outcome),
            ..Self::default()
        })
    }
}

impl TextRecognizer for FakeRecognizer {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn recognize(&self, image: &ImageReference) -> Result<StructuredText> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().remove(image.path());
        let outcome = match script {
            Some(Script { outcome, gate }) => {
                if let Some(gate) = gate {
                    let _ = gate.recv();
                }
                outcome
            }
            None => self
                .fallback
                .clone()
                .ok_or_else(|| eyre!("no script for {image}"))?,
        };
        self.finished.fetch_add(1, Ordering::SeqCst);

        match outcome {
            Scripted::Text(text) => Ok(text),
            Scripted::Error(message) => Err(eyre!(message)),
            Scripted::Panic(message) => panic!("{message}"),
        }
    }
}

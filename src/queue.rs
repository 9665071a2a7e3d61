use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::capture::{ImageReference, ImageSource, PreviewBinding};
use crate::error::PipelineError;
use crate::permission::PermissionGate;
use crate::presenter::{Event, PresenterHandle};
use crate::recognition::{RecognitionResult, RecognitionTask, Recognizer};

/// What to do with a recognition that is still running when the next image arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupersedePolicy {
    /// Let it finish. Whichever recognition completes last is displayed.
    #[default]
    LastCompleted,
    /// Abort it so only the newest image can be displayed.
    ///
    /// An engine call already running on the blocking pool cannot be
    /// interrupted. It runs to completion and its result is dropped, and a
    /// transient capture may be discarded while it is still being read.
    CancelSuperseded,
}

pub struct WorkItem {
    pub image: ImageReference,
}

pub struct WorkQueue {
    rx: mpsc::UnboundedReceiver<WorkItem>,
    tx: mpsc::UnboundedSender<WorkItem>,
    recognizer: Arc<Recognizer>,
    presenter: PresenterHandle,
    supersede: SupersedePolicy,
    discard_captures: bool,
}

impl WorkQueue {
    pub fn new(
        recognizer: Arc<Recognizer>,
        presenter: PresenterHandle,
        supersede: SupersedePolicy,
        discard_captures: bool,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            rx,
            tx,
            recognizer,
            presenter,
            supersede,
            discard_captures,
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<WorkItem> {
        self.tx.clone()
    }

    pub async fn start(mut self) {
        info!("starting work queue, supersede policy {:?}", self.supersede);
        let mut in_flight: Option<AbortHandle> = None;

        while let Some(WorkItem { image }) = self.rx.recv().await {
            self.presenter.send(Event::ImageSelected(image.clone()));
            let task = self.recognizer.submit(image.clone());

            if self.supersede == SupersedePolicy::CancelSuperseded {
                if let Some(previous) = in_flight.replace(task.abort_handle()) {
                    if !previous.is_finished() {
                        debug!("cancelling superseded recognition");
                    }
                    previous.abort();
                }
            }

            tokio::spawn(deliver(
                task,
                image,
                self.presenter.clone(),
                self.discard_captures,
            ));
        }
    }
}

async fn deliver(
    task: RecognitionTask,
    image: ImageReference,
    presenter: PresenterHandle,
    discard_captures: bool,
) {
    match task.outcome().await {
        Some(result) => presenter.send(Event::Recognized(result)),
        None => debug!("recognition of {image} was cancelled"),
    }

    if discard_captures && image.is_transient() {
        if let Err(e) = tokio::fs::remove_file(image.path()).await {
            warn!("unable to discard capture {image}: {e}");
        }
    }
}

/// Entry points for the front-end. Failures end up in the presenter, never
/// back at the caller.
#[derive(Clone)]
pub struct PipelineHandle {
    image_source: Arc<ImageSource>,
    work: mpsc::UnboundedSender<WorkItem>,
    presenter: PresenterHandle,
}

impl PipelineHandle {
    pub fn new(
        image_source: Arc<ImageSource>,
        work: mpsc::UnboundedSender<WorkItem>,
        presenter: PresenterHandle,
    ) -> Self {
        Self {
            image_source,
            work,
            presenter,
        }
    }

    /// Resolves camera permission and, when granted, binds the preview for as
    /// long as the returned binding lives.
    pub async fn start_camera(&self, gate: &PermissionGate) -> Option<PreviewBinding> {
        let permission = gate.check_or_request().await;
        self.presenter.send(Event::PermissionResolved(permission));
        if !permission.is_granted() {
            return None;
        }

        match self.image_source.bind_preview().await {
            Ok(binding) => Some(binding),
            Err(e) => {
                error!("unable to bind preview: {e}");
                self.presenter.send(Event::CameraUnavailable(e.to_string()));
                None
            }
        }
    }

    pub async fn capture(&self) {
        let captured = self.image_source.capture_from_camera().await;
        self.route(captured.map(Some));
    }

    pub async fn pick(&self) {
        let picked = self.image_source.pick_from_gallery().await;
        self.route(picked);
    }

    pub fn enqueue(&self, image: ImageReference) {
        if self.work.send(WorkItem { image }).is_err() {
            error!("work queue has stopped");
        }
    }

    fn route(&self, result: Result<Option<ImageReference>, PipelineError>) {
        match result {
            Ok(Some(image)) => self.enqueue(image),
            Ok(None) => {}
            Err(PipelineError::PermissionDenied) => {
                warn!("capture ignored, camera permission not granted");
            }
            Err(e) => {
                error!("{e}");
                self.presenter
                    .send(Event::Recognized(RecognitionResult::Failure(e.to_string())));
            }
        }
    }
}

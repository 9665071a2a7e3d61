use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::capture::ImageReference;
use crate::permission::PermissionState;
use crate::recognition::RecognitionResult;

pub const CAMERA_PERMISSION_NOTICE: &str = "Camera permission is required to use this feature.";

/// What the rendering layer gets to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub display_text: String,
    pub permission: PermissionState,
    pub selected_image: Option<ImageReference>,
    /// Shown in place of the camera when it cannot be used.
    pub camera_notice: Option<String>,
}

impl ViewState {
    fn new(placeholder: String) -> Self {
        Self {
            display_text: placeholder,
            permission: PermissionState::Unknown,
            selected_image: None,
            camera_notice: None,
        }
    }

    pub fn camera_enabled(&self) -> bool {
        self.permission.is_granted() && self.camera_notice.is_none()
    }
}

#[derive(Debug)]
pub enum Event {
    PermissionResolved(PermissionState),
    CameraUnavailable(String),
    ImageSelected(ImageReference),
    Recognized(RecognitionResult),
}

fn apply(state: &mut ViewState, event: Event) {
    trace!("applying {event:?}");
    match event {
        Event::PermissionResolved(permission) => {
            state.permission = permission;
            state.camera_notice = match permission {
                PermissionState::Denied => Some(CAMERA_PERMISSION_NOTICE.into()),
                PermissionState::Granted | PermissionState::Unknown => None,
            };
        }
        Event::CameraUnavailable(reason) => {
            state.camera_notice = Some(format!("Camera unavailable: {reason}"));
        }
        Event::ImageSelected(image) => state.selected_image = Some(image),
        Event::Recognized(RecognitionResult::Success(text)) => state.display_text = text,
        Event::Recognized(RecognitionResult::Failure(reason)) => {
            state.display_text = format!("Recognition failed: {reason}");
        }
    }
}

#[derive(Clone)]
pub struct PresenterHandle {
    events: mpsc::UnboundedSender<Event>,
}

impl PresenterHandle {
    pub fn send(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("presenter has stopped, dropping event");
        }
    }
}

/// Single owner of the view state. Events are applied one at a time in the
/// order they arrive.
pub struct Presenter {
    events: mpsc::UnboundedReceiver<Event>,
    view: watch::Sender<ViewState>,
}

impl Presenter {
    pub fn new(
        placeholder: impl Into<String>,
    ) -> (Self, PresenterHandle, watch::Receiver<ViewState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (view, view_rx) = watch::channel(ViewState::new(placeholder.into()));
        let presenter = Self { events: rx, view };
        (presenter, PresenterHandle { events: tx }, view_rx)
    }

    /// Runs until every [`PresenterHandle`] is dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.view.send_modify(|state| apply(state, event));
        }
        debug!("presenter stopped");
    }
}

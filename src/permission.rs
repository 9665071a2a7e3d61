use std::sync::Arc;

use async_trait::async_trait;
use crabgrab::capture_stream::CaptureStream;
use tokio::sync::{watch, OnceCell};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Unknown,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Camera,
}

/// Platform permission system.
#[async_trait(?Send)]
pub trait PermissionSystem {
    fn has_grant(&self, capability: Capability) -> bool;

    /// Shows the platform consent prompt and resolves once the user answers.
    async fn request_grant(&self, capability: Capability) -> bool;
}

/// Resolves camera access once per session and publishes the outcome.
pub struct PermissionGate {
    system: Arc<dyn PermissionSystem>,
    state: watch::Sender<PermissionState>,
    resolved: OnceCell<PermissionState>,
}

impl PermissionGate {
    pub fn new(system: Arc<dyn PermissionSystem>) -> Self {
        let (state, _) = watch::channel(PermissionState::Unknown);
        Self {
            system,
            state,
            resolved: OnceCell::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PermissionState> {
        self.state.subscribe()
    }

    /// The first call checks for an existing grant and otherwise asks once.
    /// Later calls return that first answer.
    #[instrument(skip(self))]
    pub async fn check_or_request(&self) -> PermissionState {
        let state = *self
            .resolved
            .get_or_init(|| async {
                let granted = if self.system.has_grant(Capability::Camera) {
                    info!("camera permission already granted");
                    true
                } else {
                    info!("requesting camera permission");
                    self.system.request_grant(Capability::Camera).await
                };

                if granted {
                    PermissionState::Granted
                } else {
                    warn!("camera permission denied, capture disabled for this session");
                    PermissionState::Denied
                }
            })
            .await;

        self.state.send_replace(state);
        state
    }
}

/// Screen-capture access, which is what the screen camera needs.
pub struct ScreenCapturePermission;

#[async_trait(?Send)]
impl PermissionSystem for ScreenCapturePermission {
    fn has_grant(&self, capability: Capability) -> bool {
        match capability {
            Capability::Camera => CaptureStream::test_access(false).is_some(),
        }
    }

    async fn request_grant(&self, capability: Capability) -> bool {
        match capability {
            Capability::Camera => CaptureStream::request_access(false).await.is_some(),
        }
    }
}

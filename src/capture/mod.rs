//! Where images come from: a still captured from the camera or a file picked
//! from the gallery. Both end up as an [`ImageReference`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::Result;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use crate::error::PipelineError;
use crate::permission::PermissionState;

pub mod screen;

const CAPTURE_PREFIX: &str = "captured_image_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    Camera,
    Gallery,
}

/// Locator for an image handed to the recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    path: Utf8PathBuf,
    origin: ImageOrigin,
}

impl ImageReference {
    pub fn new(path: impl Into<Utf8PathBuf>, origin: ImageOrigin) -> Self {
        Self {
            path: path.into(),
            origin,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn origin(&self) -> ImageOrigin {
        self.origin
    }

    /// Capture files are ours to delete once recognized, gallery files are not.
    pub fn is_transient(&self) -> bool {
        self.origin == ImageOrigin::Camera
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.path.fmt(f)
    }
}

/// A `type/subtype` filter where the subtype may be `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeFilter {
    type_: String,
    subtype: String,
}

impl MimeFilter {
    pub fn images() -> Self {
        Self {
            type_: "image".into(),
            subtype: "*".into(),
        }
    }

    pub fn accepts(&self, path: &Utf8Path) -> bool {
        mime_guess::from_path(path).iter().any(|mime| {
            mime.type_().as_str() == self.type_
                && (self.subtype == "*" || mime.subtype().as_str() == self.subtype)
        })
    }
}

impl fmt::Display for MimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)
    }
}

/// A capture device bound to the interactive session.
#[async_trait]
pub trait Camera: Send + Sync {
    async fn start_preview(&self) -> Result<()>;

    /// Writes one still frame to `destination`.
    async fn capture_still(&self, destination: &Utf8Path) -> Result<()>;

    /// Releases every binding. Must be safe to call when nothing is bound.
    fn unbind_all(&self);
}

/// Lets the user choose an existing image. `None` means they cancelled.
#[async_trait]
pub trait ImagePicker: Send + Sync {
    async fn pick_image(&self, filter: &MimeFilter) -> Result<Option<Utf8PathBuf>>;
}

fn capture_file_name(now: OffsetDateTime) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    format!("{CAPTURE_PREFIX}{millis}.jpg")
}

/// Keeps the preview bound until dropped.
///
/// Only the binding of the current session releases the camera. A binding
/// that has since been replaced drops without touching it.
pub struct PreviewBinding {
    camera: Arc<dyn Camera>,
    bound: Arc<AtomicU64>,
    generation: u64,
}

impl Drop for PreviewBinding {
    fn drop(&mut self) {
        let current = self
            .bound
            .compare_exchange(self.generation, 0, Ordering::SeqCst, Ordering::SeqCst);
        if current.is_ok() {
            self.camera.unbind_all();
            debug!("preview unbound");
        } else {
            debug!("stale preview binding {} dropped", self.generation);
        }
    }
}

pub struct ImageSource {
    camera: Arc<dyn Camera>,
    picker: Arc<dyn ImagePicker>,
    permission: watch::Receiver<PermissionState>,
    capture_directory: Utf8PathBuf,
    /// Generation of the bound preview session, 0 when none is bound.
    bound_preview: Arc<AtomicU64>,
    next_generation: AtomicU64,
}

impl ImageSource {
    pub fn new(
        camera: Arc<dyn Camera>,
        picker: Arc<dyn ImagePicker>,
        permission: watch::Receiver<PermissionState>,
        capture_directory: Utf8PathBuf,
    ) -> Self {
        Self {
            camera,
            picker,
            permission,
            capture_directory,
            bound_preview: Arc::new(AtomicU64::new(0)),
            next_generation: AtomicU64::new(1),
        }
    }

    fn camera_allowed(&self) -> bool {
        self.permission.borrow().is_granted()
    }

    pub fn preview_active(&self) -> bool {
        self.bound_preview.load(Ordering::SeqCst) != 0
    }

    /// Replaces any previous binding with a fresh preview session.
    #[instrument(skip(self))]
    pub async fn bind_preview(&self) -> Result<PreviewBinding, PipelineError> {
        if !self.camera_allowed() {
            return Err(PipelineError::PermissionDenied);
        }

        self.bound_preview.store(0, Ordering::SeqCst);
        self.camera.unbind_all();
        self.camera
            .start_preview()
            .await
            .map_err(PipelineError::capture)?;
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        self.bound_preview.store(generation, Ordering::SeqCst);
        info!("preview bound, session {generation}");

        Ok(PreviewBinding {
            camera: Arc::clone(&self.camera),
            bound: Arc::clone(&self.bound_preview),
            generation,
        })
    }

    #[instrument(skip(self))]
    pub async fn capture_from_camera(&self) -> Result<ImageReference, PipelineError> {
        if !self.camera_allowed() {
            return Err(PipelineError::PermissionDenied);
        }
        if !self.preview_active() {
            return Err(PipelineError::Capture("no preview session is bound".into()));
        }

        tokio::fs::create_dir_all(&self.capture_directory)
            .await
            .map_err(PipelineError::capture)?;
        let path = self
            .capture_directory
            .join(capture_file_name(OffsetDateTime::now_utc()));
        self.camera
            .capture_still(&path)
            .await
            .map_err(PipelineError::capture)?;
        info!("captured still to {path}");

        Ok(ImageReference::new(path, ImageOrigin::Camera))
    }

    #[instrument(skip(self))]
    pub async fn pick_from_gallery(&self) -> Result<Option<ImageReference>, PipelineError> {
        let filter = MimeFilter::images();
        let picked = self
            .picker
            .pick_image(&filter)
            .await
            .map_err(|e| PipelineError::Pick(format!("{e:#}")))?;

        let Some(path) = picked else {
            debug!("pick cancelled");
            return Ok(None);
        };
        if !filter.accepts(&path) {
            return Err(PipelineError::UnsupportedImage {
                path,
                filter: filter.to_string(),
            });
        }

        info!("picked {path}");
        Ok(Some(ImageReference::new(path, ImageOrigin::Gallery)))
    }
}

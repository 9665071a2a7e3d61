use camino::Utf8PathBuf;
use thiserror::Error;

/// Failures of a single capture or pick. None of them are retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("camera permission has not been granted")]
    PermissionDenied,
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("image picker failed: {0}")]
    Pick(String),
    #[error("{path} does not look like {filter}")]
    UnsupportedImage { path: Utf8PathBuf, filter: String },
}

impl PipelineError {
    pub fn capture(report: impl std::fmt::Display) -> Self {
        Self::Capture(format!("{report:#}"))
    }
}

//! Error kinds of the capture and detection pipeline.
//!
use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the frame source and the detection pipeline.
///
/// Capture errors only ever end the capture loop, inference errors only ever end the
/// detection request that raised them. Nothing is retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The camera could not be opened or configured.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// The camera stopped delivering frames.
    #[error("camera stream ended")]
    StreamEnded,

    /// A detection was requested before the first frame was captured.
    #[error("no frame captured yet")]
    NoFrameYet,

    /// The network rejected its input or produced unusable output.
    #[error("inference failed: {0}")]
    InferenceError(String),

    /// A model or label artifact is missing or malformed.
    #[error("failed to load {}: {reason}", path.display())]
    ArtifactLoadError { path: PathBuf, reason: String },
}

impl PipelineError {
    pub fn inference(err: impl std::fmt::Display) -> Self {
        Self::InferenceError(err.to_string())
    }

    pub fn artifact(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::ArtifactLoadError {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

//! Error types for lumen-eye

use lumen_core::Error as CoreError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    /// The video source could not be opened when a worker was started
    #[error("Video source unavailable: {0}")]
    SourceUnavailable(String),

    /// A running source stopped yielding frames and could not be recovered
    #[error("Video source interrupted: {0}")]
    SourceInterrupted(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Worker for room '{room_id}' did not stop within {timeout:?}")]
    ShutdownTimeout { room_id: String, timeout: Duration },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Occupancy report failed: {0}")]
    Report(String),

    #[error("Image error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<VisionError> for CoreError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::Core(inner) => inner,
            other => CoreError::Configuration(format!("Vision error: {}", other)),
        }
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for VisionError {
    fn from(err: opencv::Error) -> Self {
        VisionError::OpenCv(err.message)
    }
}

impl From<reqwest::Error> for VisionError {
    fn from(err: reqwest::Error) -> Self {
        VisionError::Report(err.to_string())
    }
}

//! Video source abstraction and reconnect policy

use crate::error::VisionError;
use crate::Frame;
use lumen_core::{PipelineConfig, RoomSource};
use std::time::Duration;

/// "Read next frame" over a local camera or a network stream.
///
/// `read_frame` returning `None` means end-of-stream or a transient
/// failure; hard failures to connect are reported by `open`.
pub trait VideoSource: Send {
    fn open(&mut self) -> Result<(), VisionError>;

    fn read_frame(&mut self) -> Option<Frame>;

    /// Release the underlying handle. Safe to call more than once.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Human readable description, never containing credentials
    fn describe(&self) -> String;
}

/// Builds video sources for rooms
pub trait SourceFactory: Send + Sync {
    fn create(&self, source: &RoomSource) -> Result<Box<dyn VideoSource>, VisionError>;
}

/// Factory used when the binary is built without capture support
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedSourceFactory;

impl SourceFactory for UnsupportedSourceFactory {
    fn create(&self, source: &RoomSource) -> Result<Box<dyn VideoSource>, VisionError> {
        Err(VisionError::SourceUnavailable(format!(
            "{}: video capture support is not compiled in",
            source
        )))
    }
}

/// Retry rule applied when a running source stops yielding frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub backoff: Duration,
    /// `None` retries until the worker is stopped
    pub max_attempts: Option<u32>,
    /// Close and re-open the source before the next read
    pub reopen: bool,
}

impl ReconnectPolicy {
    /// Network streams: fixed backoff, re-open, retried indefinitely
    pub fn network(backoff: Duration) -> Self {
        Self {
            backoff,
            max_attempts: None,
            reopen: true,
        }
    }

    /// Local cameras: short backoff, read again, bounded retries
    pub fn local_camera(backoff: Duration, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts: Some(max_attempts),
            reopen: false,
        }
    }

    pub fn for_source(source: &RoomSource, config: &PipelineConfig) -> Self {
        if source.is_network() {
            Self::network(config.network_retry_backoff())
        } else {
            Self::local_camera(config.camera_retry_backoff(), config.camera_max_retries)
        }
    }

    /// Whether another attempt is allowed after `failures` consecutive failures
    pub fn allows(&self, failures: u32) -> bool {
        self.max_attempts.map_or(true, |max| failures <= max)
    }
}

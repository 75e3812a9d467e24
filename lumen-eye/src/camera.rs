//! OpenCV-backed capture for local cameras and RTSP streams

use crate::error::VisionError;
use crate::source::{SourceFactory, VideoSource};
use crate::utils::mat_to_frame;
use crate::Frame;
use lumen_core::{PipelineConfig, RoomSource};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_BUFFERSIZE, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT,
        CAP_PROP_FRAME_WIDTH,
    },
};
use tracing::{debug, info, warn};

enum Target {
    Camera(i32),
    Stream(String),
}

/// A single `VideoCapture` handle
pub struct OpenCvSource {
    target: Target,
    description: String,
    resolution: (u32, u32),
    frame_rate: u32,
    capture: Option<VideoCapture>,
}

impl OpenCvSource {
    pub fn new(source: &RoomSource, config: &PipelineConfig) -> Result<Self, VisionError> {
        let target = match source {
            RoomSource::LocalCamera { index } => Target::Camera(*index),
            RoomSource::NetworkStream { url } => Target::Stream(url.clone()),
            RoomSource::None => {
                return Err(VisionError::SourceUnavailable(
                    "room has no video source".to_string(),
                ))
            }
        };
        Ok(Self {
            target,
            description: source.to_string(),
            resolution: config.camera_resolution,
            frame_rate: config.camera_fps,
            capture: None,
        })
    }

    fn try_open(&self) -> Result<VideoCapture, VisionError> {
        let mut capture = match &self.target {
            Target::Camera(index) => VideoCapture::new(*index, CAP_ANY)?,
            Target::Stream(url) => VideoCapture::from_file(url, CAP_ANY)?,
        };

        if !capture.is_opened()? {
            return Err(VisionError::SourceUnavailable(format!(
                "{} failed to open",
                self.description
            )));
        }

        // Keep latency low; backends are free to ignore this
        if let Err(e) = capture.set(CAP_PROP_BUFFERSIZE, 1.0) {
            debug!("{} does not support buffer size hint: {}", self.description, e);
        }

        if let Target::Camera(_) = self.target {
            capture.set(CAP_PROP_FRAME_WIDTH, self.resolution.0 as f64)?;
            capture.set(CAP_PROP_FRAME_HEIGHT, self.resolution.1 as f64)?;
            capture.set(CAP_PROP_FPS, self.frame_rate as f64)?;
        }

        Ok(capture)
    }
}

impl VideoSource for OpenCvSource {
    fn open(&mut self) -> Result<(), VisionError> {
        self.close();
        let capture = self.try_open().map_err(|e| match e {
            VisionError::SourceUnavailable(_) => e,
            other => VisionError::SourceUnavailable(format!("{}: {}", self.description, other)),
        })?;
        self.capture = Some(capture);
        info!("Opened video source {}", self.description);
        Ok(())
    }

    fn read_frame(&mut self) -> Option<Frame> {
        let capture = self.capture.as_mut()?;
        let mut mat = Mat::default();
        match capture.read(&mut mat) {
            Ok(true) if !mat.empty() => match mat_to_frame(&mat) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    warn!("Dropping undecodable frame from {}: {}", self.description, e);
                    None
                }
            },
            Ok(_) => None,
            Err(e) => {
                debug!("Read from {} failed: {}", self.description, e);
                None
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.release() {
                warn!("Failed to release {}: {}", self.description, e);
            }
        }
    }

    fn is_open(&self) -> bool {
        self.capture.is_some()
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

impl Drop for OpenCvSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Creates [`OpenCvSource`]s configured from the pipeline settings
#[derive(Debug, Clone)]
pub struct OpenCvSourceFactory {
    config: PipelineConfig,
}

impl OpenCvSourceFactory {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }
}

impl SourceFactory for OpenCvSourceFactory {
    fn create(&self, source: &RoomSource) -> Result<Box<dyn VideoSource>, VisionError> {
        Ok(Box::new(OpenCvSource::new(source, &self.config)?))
    }
}

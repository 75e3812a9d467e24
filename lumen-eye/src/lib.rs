//! lumen-eye: per-room video occupancy pipeline
//!
//! Each monitored room gets a [`RoomStreamWorker`] running on its own
//! thread: it reads frames from a [`VideoSource`], runs the person
//! [`Detector`] on every Nth frame, debounces occupancy, annotates and
//! JPEG-encodes the frame and publishes it for streaming consumers.
//!
//! Rooms are managed either through the [`WorkerRegistry`] (direct
//! transition callbacks) or the [`MultiRoomOrchestrator`] (transitions
//! handed to an [`OccupancyReporter`] thread).

#[cfg(feature = "opencv")]
pub mod camera;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod processing;
pub mod registry;
pub mod reporter;
pub mod source;
pub mod worker;
mod utils;

/// An RGB video frame
pub type Frame = image::RgbImage;

#[cfg(feature = "opencv")]
pub use camera::{OpenCvSource, OpenCvSourceFactory};
pub use error::VisionError;
pub use models::{BoundingBox, Detection, Detector, NoopDetector};
#[cfg(feature = "onnx")]
pub use models::YoloPersonDetector;
pub use orchestrator::{MultiRoomOrchestrator, StartOutcome};
pub use processing::{FrameAnnotator, JpegEncoder, OccupancyDebouncer, OccupancyTransition, StatusLabels};
pub use registry::WorkerRegistry;
pub use reporter::{HttpOccupancyReporter, OccupancyReporter, ReportQueue, RoomTableReporter};
pub use source::{ReconnectPolicy, SourceFactory, UnsupportedSourceFactory, VideoSource};
pub use worker::{
    PipelineContext, PublishedFrame, RoomStreamWorker, TransitionCallback, WorkerSnapshot, WorkerSpec,
    WorkerState,
};

//! Per-frame processing stages of the room pipeline

pub mod annotator;
pub mod debouncer;
pub mod detection;
pub mod encoder;

pub use annotator::{FrameAnnotator, StatusLabels};
pub use debouncer::{OccupancyDebouncer, OccupancyTransition};
pub use detection::DetectionPipeline;
pub use encoder::JpegEncoder;

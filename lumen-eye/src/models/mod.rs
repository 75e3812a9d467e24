//! Person detection capability and detection types

#[cfg(feature = "onnx")]
pub mod yolo;

#[cfg(feature = "onnx")]
pub use yolo::YoloPersonDetector;

use crate::error::VisionError;
use crate::Frame;
use serde::Serialize;

/// COCO class id of "person"
pub const PERSON_CLASS_ID: usize = 0;

/// Axis-aligned box in pixel coordinates (top-left, bottom-right)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Multiply every coordinate by `factor`
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            x1: self.x1 * factor,
            y1: self.y1 * factor,
            x2: self.x2 * factor,
            y2: self.y2 * factor,
        }
    }

    /// Restrict the box to a `width` x `height` frame
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = BoundingBox {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        };
        let inter_area = inter.area();
        let union_area = self.area() + other.area() - inter_area;
        if union_area <= 0.0 || !union_area.is_finite() {
            return 0.0;
        }
        (inter_area / union_area).clamp(0.0, 1.0)
    }
}

/// One detected object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: usize,
}

impl Detection {
    pub fn person(bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            bbox,
            confidence,
            class_id: PERSON_CLASS_ID,
        }
    }

    pub fn is_person(&self) -> bool {
        self.class_id == PERSON_CLASS_ID
    }
}

/// Black-box person detector invoked once per processed frame.
///
/// Implementations are shared between room workers, so `detect` takes
/// `&self` and must be safe to call from several worker threads.
pub trait Detector: Send + Sync {
    /// Detect objects in `frame` whose confidence is at least
    /// `confidence_threshold`. Callers filter the result to persons.
    fn detect(&self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>, VisionError>;

    fn name(&self) -> &str;
}

/// Detector that never sees anyone; used when no model is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDetector;

impl Detector for NoopDetector {
    fn detect(&self, _frame: &Frame, _confidence_threshold: f32) -> Result<Vec<Detection>, VisionError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Greedy non-maximum suppression, highest confidence first
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.retain(|d| d.confidence.is_finite());
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let overlaps = keep.iter().any(|kept| {
            kept.class_id == candidate.class_id && kept.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}

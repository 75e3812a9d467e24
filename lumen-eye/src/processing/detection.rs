//! Person detection pipeline

use crate::error::VisionError;
use crate::models::{Detection, Detector};
use crate::utils::downscale;
use crate::Frame;
use std::sync::Arc;
use tracing::debug;

/// Runs the detector on a downscaled copy of the frame and maps the
/// person boxes back to original-frame coordinates.
#[derive(Clone)]
pub struct DetectionPipeline {
    detector: Arc<dyn Detector>,
    confidence_threshold: f32,
    resize_factor: f32,
}

impl DetectionPipeline {
    pub fn new(detector: Arc<dyn Detector>, confidence_threshold: f32, resize_factor: f32) -> Self {
        Self {
            detector,
            confidence_threshold,
            resize_factor,
        }
    }

    /// Person detections in original-frame coordinates
    pub fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        let (width, height) = frame.dimensions();
        let small = downscale(frame, self.resize_factor);

        let (detections, scale) = match &small {
            Some(small) => {
                let scale = width as f32 / small.width() as f32;
                (self.detector.detect(small, self.confidence_threshold)?, scale)
            }
            None => (self.detector.detect(frame, self.confidence_threshold)?, 1.0),
        };

        let persons: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.is_person() && d.confidence >= self.confidence_threshold)
            .map(|mut d| {
                d.bbox = d.bbox.scaled(scale).clamped(width, height);
                d
            })
            .collect();

        debug!(detector = self.detector.name(), "Detected {} persons", persons.len());
        Ok(persons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;

    struct FixedDetector(Vec<Detection>);

    impl Detector for FixedDetector {
        fn detect(&self, _frame: &Frame, _threshold: f32) -> Result<Vec<Detection>, VisionError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn test_filters_non_persons_and_low_confidence() {
        let detector = FixedDetector(vec![
            Detection::person(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.9),
            Detection::person(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.2),
            Detection {
                bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
                confidence: 0.95,
                class_id: 56,
            },
        ]);
        let pipeline = DetectionPipeline::new(Arc::new(detector), 0.4, 1.0);
        let persons = pipeline.detect(&Frame::new(100, 100)).unwrap();
        assert_eq!(persons.len(), 1);
        assert_eq!(persons[0].confidence, 0.9);
    }

    #[test]
    fn test_maps_boxes_back_to_original_frame() {
        // 0.5 downscale of 200x100 is 100x50
        let detector = FixedDetector(vec![Detection::person(
            BoundingBox::new(10.0, 5.0, 50.0, 25.0),
            0.8,
        )]);
        let pipeline = DetectionPipeline::new(Arc::new(detector), 0.4, 0.5);
        let persons = pipeline.detect(&Frame::new(200, 100)).unwrap();
        assert_eq!(persons[0].bbox, BoundingBox::new(20.0, 10.0, 100.0, 50.0));
    }
}

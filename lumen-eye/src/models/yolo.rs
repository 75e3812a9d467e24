//! YOLOv8 person detector on ONNX Runtime

use super::{non_max_suppression, BoundingBox, Detection, Detector, PERSON_CLASS_ID};
use crate::error::VisionError;
use crate::Frame;
use image::imageops::{self, FilterType};
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};

/// Square network input side
const INPUT_SIZE: u32 = 640;
const NUM_CLASSES: usize = 80;
const IOU_THRESHOLD: f32 = 0.45;

/// YOLOv8 model exported with the standard `[1, 84, N]` output head
pub struct YoloPersonDetector {
    // Session::run needs exclusive access
    session: Mutex<Session>,
}

impl YoloPersonDetector {
    pub fn load(model_path: &Path) -> Result<Self, VisionError> {
        let session = Session::builder()
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(|e| VisionError::Model(format!("Failed to load YOLO model {:?}: {}", model_path, e)))?;

        info!("YOLO model loaded from {:?}", model_path);
        Ok(Self {
            session: Mutex::new(session),
        })
    }

    fn preprocess(frame: &Frame) -> Result<Tensor<f32>, VisionError> {
        let resized = imageops::resize(frame, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

        // NCHW, normalized to [0, 1]
        let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
        let mut data = vec![0f32; 3 * plane];
        for (idx, pixel) in resized.pixels().enumerate() {
            data[idx] = pixel[0] as f32 / 255.0;
            data[plane + idx] = pixel[1] as f32 / 255.0;
            data[2 * plane + idx] = pixel[2] as f32 / 255.0;
        }

        let shape = [1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize];
        Tensor::from_array((shape, data.into_boxed_slice()))
            .map_err(|e| VisionError::Detector(format!("Failed to create input tensor: {}", e)))
    }
}

impl Detector for YoloPersonDetector {
    fn detect(&self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>, VisionError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }
        let input = Self::preprocess(frame)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| VisionError::Detector(format!("YOLO inference failed: {}", e)))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::Detector(format!("Failed to extract output tensor: {}", e)))?;

        // [1, 4 + classes, proposals], stored row per attribute
        if shape.len() != 3 || shape[1] < (4 + NUM_CLASSES) as i64 {
            return Err(VisionError::Detector(format!("Unexpected YOLO output shape {:?}", shape)));
        }
        let proposals = shape[2] as usize;
        let attribute = |row: usize, i: usize| data[row * proposals + i];

        let scale_x = width as f32 / INPUT_SIZE as f32;
        let scale_y = height as f32 / INPUT_SIZE as f32;

        let mut candidates = Vec::new();
        for i in 0..proposals {
            let (best_class, best_score) = (0..NUM_CLASSES)
                .map(|c| (c, attribute(4 + c, i)))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

            if best_class != PERSON_CLASS_ID || best_score < confidence_threshold {
                continue;
            }

            let (cx, cy) = (attribute(0, i), attribute(1, i));
            let (w, h) = (attribute(2, i), attribute(3, i));
            if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) {
                continue;
            }

            let bbox = BoundingBox::new(
                (cx - w / 2.0) * scale_x,
                (cy - h / 2.0) * scale_y,
                (cx + w / 2.0) * scale_x,
                (cy + h / 2.0) * scale_y,
            )
            .clamped(width, height);
            if bbox.area() > 0.0 {
                candidates.push(Detection::person(bbox, best_score));
            }
        }

        let detections = non_max_suppression(candidates, IOU_THRESHOLD);
        debug!("YOLO detected {} persons", detections.len());
        Ok(detections)
    }

    fn name(&self) -> &str {
        "yolov8"
    }
}

//! Frame helpers shared by the pipeline stages

use crate::Frame;
use image::imageops::{self, FilterType};

/// Downscale `frame` by `factor` for detection. Returns `None` when no
/// resize is needed (factor of 1 or a frame too small to shrink).
pub fn downscale(frame: &Frame, factor: f32) -> Option<Frame> {
    if !(factor > 0.0 && factor < 1.0) {
        return None;
    }
    let (width, height) = frame.dimensions();
    let new_width = ((width as f32 * factor).round() as u32).max(1);
    let new_height = ((height as f32 * factor).round() as u32).max(1);
    if new_width == width && new_height == height {
        return None;
    }
    Some(imageops::resize(frame, new_width, new_height, FilterType::Triangle))
}

/// Convert a BGR `Mat` from OpenCV into an RGB frame
#[cfg(feature = "opencv")]
pub fn mat_to_frame(mat: &opencv::core::Mat) -> Result<Frame, crate::error::VisionError> {
    use crate::error::VisionError;
    use opencv::prelude::*;

    let (cols, rows) = (mat.cols(), mat.rows());
    if cols <= 0 || rows <= 0 {
        return Err(VisionError::OpenCv("Empty frame".to_string()));
    }
    if mat.channels() != 3 {
        return Err(VisionError::OpenCv(format!(
            "Expected 3 channel frame, got {}",
            mat.channels()
        )));
    }

    let mut rgb = opencv::core::Mat::default();
    opencv::imgproc::cvt_color(mat, &mut rgb, opencv::imgproc::COLOR_BGR2RGB, 0)?;
    let continuous = if rgb.is_continuous() { rgb } else { rgb.try_clone()? };
    let data = continuous.data_bytes()?.to_vec();

    Frame::from_raw(cols as u32, rows as u32, data)
        .ok_or_else(|| VisionError::OpenCv("Frame buffer size mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downscale_factor() {
        let frame = Frame::new(640, 480);
        let small = downscale(&frame, 0.6).unwrap();
        assert_eq!(small.dimensions(), (384, 288));
    }

    #[test]
    fn test_downscale_noop() {
        let frame = Frame::new(640, 480);
        assert!(downscale(&frame, 1.0).is_none());
        assert!(downscale(&frame, 0.0).is_none());

        let tiny = Frame::new(1, 1);
        assert!(downscale(&tiny, 0.6).is_none());
    }
}

//! Draw detection boxes and the room status block onto frames

use crate::error::VisionError;
use crate::models::Detection;
use crate::Frame;
use ab_glyph::{FontArc, PxScale};
use image::Rgb;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use lumen_core::DeviceState;
use std::path::Path;
use tracing::{info, warn};

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

const STATUS_WIDTH: u32 = 400;
const STATUS_HEIGHT: u32 = 120;
const INDICATOR_SIZE: u32 = 14;

/// DejaVu Sans Mono, see `assets/DejaVu-LICENSE.txt`
static BUNDLED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSansMono.ttf");

/// Values shown in the status block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusLabels {
    pub person_count: usize,
    pub occupied: bool,
    pub light: bool,
    pub ac: bool,
}

impl StatusLabels {
    pub fn new(person_count: usize, devices: DeviceState) -> Self {
        Self {
            person_count,
            occupied: person_count > 0,
            light: devices.light,
            ac: devices.ac,
        }
    }
}

/// Overlays detections and status onto a copy of a frame.
///
/// Labels use the bundled font unless another one is loaded. Without any
/// font only boxes, the status background and colored indicators are drawn.
#[derive(Clone)]
pub struct FrameAnnotator {
    font: Option<FontArc>,
}

impl Default for FrameAnnotator {
    fn default() -> Self {
        Self::bundled()
    }
}

impl FrameAnnotator {
    pub fn new(font: Option<FontArc>) -> Self {
        Self { font }
    }

    /// Annotator using the font compiled into the crate
    pub fn bundled() -> Self {
        match FontArc::try_from_slice(BUNDLED_FONT) {
            Ok(font) => Self::new(Some(font)),
            Err(e) => {
                warn!("Bundled label font unusable, drawing without text: {}", e);
                Self::new(None)
            }
        }
    }

    /// Load `path` as the label font, or fall back to the bundled one
    pub fn from_font_file(path: Option<&Path>) -> Result<Self, VisionError> {
        let Some(path) = path else {
            return Ok(Self::bundled());
        };
        let data = std::fs::read(path)?;
        let font = FontArc::try_from_vec(data)
            .map_err(|e| VisionError::Model(format!("Invalid font {:?}: {}", path, e)))?;
        info!("Loaded label font from {:?}", path);
        Ok(Self::new(Some(font)))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Annotated copy of `frame`; the input is left untouched
    pub fn annotate(&self, frame: &Frame, detections: &[Detection], labels: &StatusLabels) -> Frame {
        let mut canvas = frame.clone();
        for detection in detections {
            self.draw_detection(&mut canvas, detection);
        }
        self.draw_status(&mut canvas, labels);
        canvas
    }

    /// Black frame with a red message, shown when no worker is connected
    pub fn placeholder(&self, width: u32, height: u32, message: &str) -> Frame {
        let mut canvas = Frame::new(width.max(1), height.max(1));
        match &self.font {
            Some(font) => {
                let scale = PxScale::from(36.0);
                let (text_w, text_h) = text_size(scale, font, message);
                let x = (width as i32 - text_w as i32) / 2;
                let y = (height as i32 - text_h as i32) / 2;
                draw_text_mut(&mut canvas, RED, x.max(0), y.max(0), scale, font, message);
            }
            None => {
                let bar = Rect::at(width as i32 / 4, height as i32 / 2 - 4)
                    .of_size((width / 2).max(1), 8);
                draw_filled_rect_mut(&mut canvas, bar, RED);
            }
        }
        canvas
    }

    fn draw_detection(&self, canvas: &mut Frame, detection: &Detection) {
        let bbox = detection.bbox.clamped(canvas.width(), canvas.height());
        let (x, y) = (bbox.x1 as i32, bbox.y1 as i32);
        let (w, h) = ((bbox.width() as u32).max(1), (bbox.height() as u32).max(1));

        // 2px border
        draw_hollow_rect_mut(canvas, Rect::at(x, y).of_size(w, h), GREEN);
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(canvas, Rect::at(x + 1, y + 1).of_size(w - 2, h - 2), GREEN);
        }

        if let Some(font) = &self.font {
            let label = format!("Person {:.2}", detection.confidence);
            let scale = PxScale::from(16.0);
            let (text_w, text_h) = text_size(scale, font, &label);
            let top = (y - text_h as i32 - 4).max(0);
            draw_filled_rect_mut(
                canvas,
                Rect::at(x, top).of_size(text_w.max(1), text_h + 4),
                GREEN,
            );
            draw_text_mut(canvas, BLACK, x, top + 2, scale, font, &label);
        }
    }

    fn draw_status(&self, canvas: &mut Frame, labels: &StatusLabels) {
        let width = STATUS_WIDTH.min(canvas.width());
        let height = STATUS_HEIGHT.min(canvas.height());
        draw_filled_rect_mut(canvas, Rect::at(0, 0).of_size(width, height), BLACK);

        let status_color = if labels.occupied { RED } else { GREEN };
        let light_color = if labels.light { GREEN } else { RED };
        let ac_color = if labels.ac { GREEN } else { RED };

        match &self.font {
            Some(font) => {
                let count = format!("People: {}", labels.person_count);
                let status = if labels.occupied { "OCCUPIED" } else { "EMPTY" };
                let light = if labels.light { "LIGHT: ON" } else { "LIGHT: OFF" };
                let ac = if labels.ac { "AC: ON" } else { "AC: OFF" };

                draw_text_mut(canvas, YELLOW, 10, 8, PxScale::from(30.0), font, &count);
                draw_text_mut(canvas, status_color, 10, 44, PxScale::from(24.0), font, status);
                draw_text_mut(canvas, light_color, 10, 78, PxScale::from(22.0), font, light);
                draw_text_mut(canvas, ac_color, 220, 78, PxScale::from(22.0), font, ac);
            }
            None => {
                for (slot, color) in [status_color, light_color, ac_color].into_iter().enumerate() {
                    let x = 10 + slot as i32 * (INDICATOR_SIZE as i32 + 10);
                    draw_filled_rect_mut(
                        canvas,
                        Rect::at(x, 10).of_size(INDICATOR_SIZE, INDICATOR_SIZE),
                        color,
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for FrameAnnotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAnnotator")
            .field("font", &self.font.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;

    fn gray_frame() -> Frame {
        Frame::from_pixel(640, 480, Rgb([128, 128, 128]))
    }

    /// Count pixels in `[x0, x1) x [y0, y1)` matching `pred`
    fn count_in(frame: &Frame, (x0, y0, x1, y1): (u32, u32, u32, u32), pred: impl Fn(&Rgb<u8>) -> bool) -> usize {
        (y0..y1)
            .flat_map(|y| (x0..x1).map(move |x| (x, y)))
            .filter(|&(x, y)| pred(frame.get_pixel(x, y)))
            .count()
    }

    fn reddish(p: &Rgb<u8>) -> bool {
        p[0] > 200 && p[1] < 80 && p[2] < 80
    }

    #[test]
    fn test_annotate_does_not_mutate_input() {
        let frame = gray_frame();
        let detections = vec![Detection::person(BoundingBox::new(100.0, 200.0, 300.0, 400.0), 0.9)];
        let annotated = FrameAnnotator::default().annotate(&frame, &detections, &StatusLabels::default());

        assert!(frame.pixels().all(|p| *p == Rgb([128, 128, 128])));
        assert_eq!(annotated.dimensions(), frame.dimensions());
        assert_ne!(annotated, frame);
    }

    #[test]
    fn test_default_annotator_draws_text() {
        let annotator = FrameAnnotator::default();
        assert!(annotator.has_font());

        let frame = gray_frame();
        let detections = vec![Detection::person(BoundingBox::new(100.0, 200.0, 300.0, 400.0), 0.9)];
        let labels = StatusLabels::new(1, DeviceState { light: true, ac: false });
        let annotated = annotator.annotate(&frame, &detections, &labels);

        // box border
        assert_eq!(*annotated.get_pixel(100, 300), GREEN);
        assert_eq!(*annotated.get_pixel(200, 300), Rgb([128, 128, 128]));

        // dark confidence text on the green label strip above the box
        let label_strip = (100, 170, 220, 200);
        assert!(count_in(&annotated, label_strip, |p| *p == GREEN) > 0);
        assert!(count_in(&annotated, label_strip, |p| p[1] < 80) > 0);

        // "People: 1" in yellow, "OCCUPIED" in red, "LIGHT: ON" in green,
        // "AC: OFF" in red
        assert!(count_in(&annotated, (10, 8, 390, 42), |p| p[0] > 200 && p[1] > 200 && p[2] < 80) > 20);
        assert!(count_in(&annotated, (10, 44, 390, 76), reddish) > 20);
        assert!(count_in(&annotated, (10, 78, 210, 110), |p| p[1] > 200 && p[0] < 80) > 20);
        assert!(count_in(&annotated, (220, 78, 400, 110), reddish) > 20);
        assert_eq!(*annotated.get_pixel(399, 119), BLACK);
    }

    #[test]
    fn test_indicators_without_font() {
        let annotator = FrameAnnotator::new(None);
        let labels = StatusLabels::new(1, DeviceState { light: true, ac: false });
        let annotated = annotator.annotate(&gray_frame(), &[], &labels);

        assert_eq!(*annotated.get_pixel(12, 12), RED);
        assert_eq!(*annotated.get_pixel(36, 12), GREEN);
        assert_eq!(*annotated.get_pixel(60, 12), RED);
        assert_eq!(*annotated.get_pixel(399, 119), BLACK);
    }

    #[test]
    fn test_detection_outside_frame_is_clamped() {
        let frame = Frame::new(50, 50);
        let detections = vec![Detection::person(BoundingBox::new(-20.0, -20.0, 500.0, 500.0), 0.5)];
        let annotated = FrameAnnotator::default().annotate(&frame, &detections, &StatusLabels::default());
        assert_eq!(annotated.dimensions(), (50, 50));
    }

    #[test]
    fn test_placeholder() {
        let frame = FrameAnnotator::default().placeholder(640, 480, "Camera Not Connected");
        assert_eq!(frame.dimensions(), (640, 480));
        assert_eq!(*frame.get_pixel(0, 0), BLACK);
        assert!(count_in(&frame, (0, 200, 640, 280), reddish) > 50);

        let plain = FrameAnnotator::new(None).placeholder(640, 480, "Camera Not Connected");
        assert_eq!(*plain.get_pixel(320, 240), RED);
    }

    #[test]
    fn test_font_file_override() {
        let result = FrameAnnotator::from_font_file(Some(Path::new("/nonexistent/font.ttf")));
        assert!(matches!(result, Err(VisionError::Io(_))));
        assert!(FrameAnnotator::from_font_file(None).unwrap().has_font());
    }
}

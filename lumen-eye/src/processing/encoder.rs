//! JPEG encoding of annotated frames

use crate::error::VisionError;
use crate::Frame;
use bytes::Bytes;
use image::codecs::jpeg;
use image::ExtendedColorType;

#[derive(Debug, Clone, Copy)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn encode(&self, frame: &Frame) -> Result<Bytes, VisionError> {
        let (width, height) = frame.dimensions();
        let mut buffer = Vec::with_capacity((width * height / 8) as usize);
        jpeg::JpegEncoder::new_with_quality(&mut buffer, self.quality).encode(
            frame.as_raw(),
            width,
            height,
            ExtendedColorType::Rgb8,
        )?;
        Ok(Bytes::from(buffer))
    }
}

//! JPEG compression and decode for buffered frames

use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, RgbImage};

use crate::Result;

/// Decode any supported still image (JPEG or PNG) into RGB pixels
pub fn decode_frame(data: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(data)?;
    Ok(image.to_rgb8())
}

/// Encode RGB pixels as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Bytes> {
    let mut buffer = Vec::with_capacity((image.width() * image.height()) as usize / 4);
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(image)?;
    Ok(Bytes::from(buffer))
}

/// Resizes frames to a fixed resolution and compresses them
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

impl FrameCodec {
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width,
            height,
            quality,
        }
    }

    pub fn normalize(&self, image: &RgbImage) -> RgbImage {
        if image.dimensions() == (self.width, self.height) {
            return image.clone();
        }
        image::imageops::resize(image, self.width, self.height, FilterType::Triangle)
    }

    /// Normalize then JPEG-encode
    pub fn compress(&self, image: &RgbImage) -> Result<Bytes> {
        let normalized = self.normalize(image);
        encode_jpeg(&normalized, self.quality)
    }
}

use bytes::Bytes;
use image::RgbImage;

/// Compressed frame as held by a buffer
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedFrame {
    /// Seconds on the relay's monotonic clock
    pub timestamp: f64,

    /// JPEG bytes - cloning shares the allocation
    pub payload: Bytes,
}

impl TimestampedFrame {
    pub fn new(timestamp: f64, payload: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            payload: payload.into(),
        }
    }
}

/// Frame decoded back to pixels, owned by the caller
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub timestamp: f64,
    pub image: RgbImage,
}

impl DecodedFrame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

//! Rolling time-window of raw ingested frames

use image::RgbImage;
use tracing::{debug, warn};

use crate::capture::{codec, DecodedFrame, FrameCodec, TimestampedFrame};
use crate::pipeline::ringbuf::{FrameRing, RingStats};
use crate::{BufferConfig, RelayError, Result};

/// Holds the last `max_seconds * target_fps` frames, JPEG-compressed at a
/// fixed resolution. Written by one ingress path, read by the vision worker.
pub struct FrameBuffer {
    ring: FrameRing,
    codec: FrameCodec,
}

impl FrameBuffer {
    pub fn new(max_seconds: u32, target_fps: u32, codec: FrameCodec) -> Result<Self> {
        let capacity = (max_seconds as usize)
            .checked_mul(target_fps as usize)
            .ok_or_else(|| RelayError::InvalidConfig("frame buffer capacity overflows".into()))?;
        Ok(Self {
            ring: FrameRing::new(capacity)?,
            codec,
        })
    }

    pub fn from_config(config: &BufferConfig) -> Result<Self> {
        Self::new(
            config.max_seconds,
            config.target_fps,
            FrameCodec::new(config.frame_width, config.frame_height, config.jpeg_quality),
        )
    }

    /// Normalize, compress and append a frame.
    ///
    /// A frame that fails to compress is dropped; the return value only says
    /// whether it was stored.
    pub fn add(&self, image: &RgbImage, timestamp: f64) -> bool {
        match self.codec.compress(image) {
            Ok(payload) => {
                self.ring.push(TimestampedFrame::new(timestamp, payload));
                metrics::counter!("frames_ingested").increment(1);
                true
            }
            Err(e) => {
                debug!("Dropping frame at {timestamp:.3}: {e}");
                metrics::counter!("frames_dropped").increment(1);
                false
            }
        }
    }

    /// Most recent frame, decoded outside the lock
    pub fn latest(&self) -> Option<DecodedFrame> {
        let frame = self.ring.latest()?;
        decode(frame)
    }

    /// Frames with `start <= timestamp <= end`, oldest first, decoded outside the lock
    pub fn between(&self, start: f64, end: f64) -> Vec<DecodedFrame> {
        self.ring
            .between(start, end)
            .into_iter()
            .filter_map(decode)
            .collect()
    }

    /// Timestamp of the newest entry without decoding it
    pub fn latest_timestamp(&self) -> Option<f64> {
        self.ring.latest().map(|frame| frame.timestamp)
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn stats(&self) -> RingStats {
        self.ring.stats()
    }
}

fn decode(frame: TimestampedFrame) -> Option<DecodedFrame> {
    match codec::decode_frame(&frame.payload) {
        Ok(image) => Some(DecodedFrame {
            timestamp: frame.timestamp,
            image,
        }),
        Err(e) => {
            warn!("Buffered frame at {:.3} failed to decode: {e}", frame.timestamp);
            None
        }
    }
}

//! Most recent annotated frames, ready to send

use bytes::Bytes;

use crate::capture::TimestampedFrame;
use crate::pipeline::ringbuf::{FrameRing, RingStats};
use crate::Result;

/// Small FIFO of annotated JPEG frames. The vision worker is the only
/// writer; session egress paths and the snapshot endpoint read.
pub struct OutputBuffer {
    ring: FrameRing,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            ring: FrameRing::new(capacity)?,
        })
    }

    pub fn add(&self, payload: impl Into<Bytes>, timestamp: f64) {
        self.ring.push(TimestampedFrame::new(timestamp, payload));
    }

    pub fn latest(&self) -> Option<TimestampedFrame> {
        self.ring.latest()
    }

    /// `min(n, len)` payloads evenly spaced from oldest to newest
    pub fn sample(&self, n: usize) -> Vec<Bytes> {
        self.ring
            .sample(n)
            .into_iter()
            .map(|frame| frame.payload)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn stats(&self) -> RingStats {
        self.ring.stats()
    }
}

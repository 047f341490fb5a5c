//! Detector and tracker capabilities consumed by the vision worker

use image::RgbImage;
use serde::Serialize;

use crate::Result;

/// Axis-aligned box in pixel coordinates
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

    /// Intersection over union, 0.0 for disjoint or degenerate boxes
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = BoundingBox::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        )
        .area();
        let union = self.area() + other.area() - inter;
        if union <= f32::EPSILON {
            0.0
        } else {
            inter / union
        }
    }
}

/// Single candidate returned by a detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
}

/// Object with an identity that persists across frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Track {
    pub track_id: u64,
    pub bbox: BoundingBox,
}

/// Object detection backend.
///
/// Implementations wrap a model; the worker owns exactly one and calls it
/// from its own thread.
pub trait Detector: Send {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>>;
}

/// Multi-object tracker resolving identities across frames
pub trait Tracker: Send {
    fn update(&mut self, frame: &RgbImage, detections: &[Detection]) -> Result<Vec<Track>>;
}

/// Detector that never finds anything. Lets the relay run without a model;
/// frames pass through unannotated.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

/// Keep detections of the wanted classes scoring strictly above `threshold`.
/// An empty class list keeps every class.
pub fn filter_detections(detections: Vec<Detection>, classes: &[u32], threshold: f32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.confidence > threshold)
        .filter(|d| classes.is_empty() || classes.contains(&d.class_id))
        .collect()
}

//! Detection, tracking and annotation for the relay's worker
//!
//! - `detector`: capability traits and the types they exchange.
//! - `tracker`: default IoU tracker.
//! - `annotate`: drawing tracks onto frames.

pub mod annotate;
pub mod detector;
pub mod tracker;

pub use annotate::{annotate, color_for, PALETTE};
pub use detector::{filter_detections, BoundingBox, Detection, Detector, NullDetector, Track, Tracker};
pub use tracker::IouTracker;

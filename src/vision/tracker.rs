//! Greedy IoU association tracker

use image::RgbImage;

use crate::vision::detector::{BoundingBox, Detection, Track, Tracker};
use crate::Result;

#[derive(Debug, Clone)]
struct TrackState {
    id: u64,
    bbox: BoundingBox,
    /// Consecutive updates without a matching detection
    missed: u32,
}

/// Matches each detection to the live track it overlaps most, highest
/// confidence first. Unmatched detections open new tracks; tracks unseen for
/// more than `max_missed` updates are dropped.
#[derive(Debug)]
pub struct IouTracker {
    tracks: Vec<TrackState>,
    next_id: u64,
    iou_threshold: f32,
    max_missed: u32,
}

impl IouTracker {
    pub fn new(iou_threshold: f32, max_missed: u32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            iou_threshold,
            max_missed,
        }
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.len()
    }
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new(0.3, 5)
    }
}

impl Tracker for IouTracker {
    fn update(&mut self, _frame: &RgbImage, detections: &[Detection]) -> Result<Vec<Track>> {
        let mut order: Vec<&Detection> = detections.iter().collect();
        order.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut matched = vec![false; self.tracks.len()];
        let mut visible = Vec::with_capacity(detections.len());

        for detection in order {
            let best = self
                .tracks
                .iter()
                .enumerate()
                .filter(|(i, _)| !matched[*i])
                .map(|(i, t)| (i, t.bbox.iou(&detection.bbox)))
                .filter(|(_, iou)| *iou >= self.iou_threshold)
                .max_by(|a, b| a.1.total_cmp(&b.1));

            match best {
                Some((i, _)) => {
                    matched[i] = true;
                    let track = &mut self.tracks[i];
                    track.bbox = detection.bbox;
                    track.missed = 0;
                    visible.push(Track {
                        track_id: track.id,
                        bbox: track.bbox,
                    });
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.tracks.push(TrackState {
                        id,
                        bbox: detection.bbox,
                        missed: 0,
                    });
                    matched.push(true);
                    visible.push(Track {
                        track_id: id,
                        bbox: detection.bbox,
                    });
                }
            }
        }

        for (track, seen) in self.tracks.iter_mut().zip(&matched) {
            if !seen {
                track.missed += 1;
            }
        }
        let max_missed = self.max_missed;
        self.tracks.retain(|t| t.missed <= max_missed);

        visible.sort_by_key(|t| t.track_id);
        Ok(visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(x: f32, confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(x, 10.0, x + 40.0, 90.0),
            confidence,
            class_id: 0,
        }
    }

    fn frame() -> RgbImage {
        RgbImage::new(8, 8)
    }

    #[test]
    fn identity_persists_while_object_moves() {
        let mut tracker = IouTracker::default();
        let first = tracker.update(&frame(), &[person(0.0, 0.9)]).unwrap();
        let second = tracker.update(&frame(), &[person(5.0, 0.9)]).unwrap();
        assert_eq!(first[0].track_id, second[0].track_id);
        assert_eq!(second[0].bbox.x1, 5.0);
    }

    #[test]
    fn separate_objects_get_distinct_ids() {
        let mut tracker = IouTracker::default();
        let tracks = tracker
            .update(&frame(), &[person(0.0, 0.8), person(200.0, 0.9)])
            .unwrap();
        assert_eq!(tracks.len(), 2);
        assert_ne!(tracks[0].track_id, tracks[1].track_id);
    }

    #[test]
    fn unseen_tracks_expire() {
        let mut tracker = IouTracker::new(0.3, 2);
        tracker.update(&frame(), &[person(0.0, 0.9)]).unwrap();
        for _ in 0..2 {
            assert!(tracker.update(&frame(), &[]).unwrap().is_empty());
            assert_eq!(tracker.live_tracks(), 1);
        }
        tracker.update(&frame(), &[]).unwrap();
        assert_eq!(tracker.live_tracks(), 0);

        let reborn = tracker.update(&frame(), &[person(0.0, 0.9)]).unwrap();
        assert_eq!(reborn[0].track_id, 2);
    }
}

//! Bounded, FIFO-evicting ring of timestamped frames

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crossbeam::utils::CachePadded;
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;
use serde::Serialize;

use crate::capture::TimestampedFrame;
use crate::{RelayError, Result};

/// Lock-guarded ring buffer holding compressed frames in timestamp order.
///
/// Appends take the write lock for the full-check, evict and push sequence.
/// Readers copy entries out under the read lock; payloads are `Bytes`, so
/// the copy is a refcount bump and decoding happens after the lock is gone.
pub struct FrameRing {
    ring: RwLock<HeapRb<TimestampedFrame>>,
    capacity: usize,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_written: AtomicUsize,
    frames_evicted: AtomicUsize,
}

/// Point-in-time counters for a ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RingStats {
    pub len: usize,
    pub capacity: usize,
    pub written: usize,
    pub evicted: usize,
}

impl FrameRing {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(RelayError::InvalidConfig(
                "frame ring capacity must be at least 1".into(),
            ));
        }
        Ok(Self {
            ring: RwLock::new(HeapRb::new(capacity)),
            capacity,
            stats: CachePadded::new(Stats::default()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, HeapRb<TimestampedFrame>> {
        self.ring.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HeapRb<TimestampedFrame>> {
        self.ring.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer: append a frame, evicting the oldest when full.
    /// Returns true if an entry was evicted.
    pub fn push(&self, frame: TimestampedFrame) -> bool {
        let mut ring = self.write();

        let evicted = if ring.is_full() {
            // Drop oldest frame
            ring.try_pop();
            self.stats.frames_evicted.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        };

        // Cannot fail: a slot was freed above if the ring was full
        let _ = ring.try_push(frame);
        self.stats.frames_written.fetch_add(1, Ordering::Relaxed);
        evicted
    }

    pub fn latest(&self) -> Option<TimestampedFrame> {
        self.read().iter().last().cloned()
    }

    /// Entries with `start <= timestamp <= end`, oldest first
    pub fn between(&self, start: f64, end: f64) -> Vec<TimestampedFrame> {
        self.read()
            .iter()
            .filter(|frame| start <= frame.timestamp && frame.timestamp <= end)
            .cloned()
            .collect()
    }

    /// Copy of every entry, oldest first
    pub fn snapshot(&self) -> Vec<TimestampedFrame> {
        self.read().iter().cloned().collect()
    }

    /// `min(n, len)` entries spread evenly from oldest to newest
    pub fn sample(&self, n: usize) -> Vec<TimestampedFrame> {
        let ring = self.read();
        let indices = evenly_spaced_indices(ring.occupied_len(), n);
        let mut picked = Vec::with_capacity(indices.len());
        let mut wanted = indices.into_iter().peekable();
        for (index, frame) in ring.iter().enumerate() {
            match wanted.peek() {
                Some(&next) if next == index => {
                    picked.push(frame.clone());
                    wanted.next();
                }
                Some(_) => {}
                None => break,
            }
        }
        picked
    }

    pub fn len(&self) -> usize {
        self.read().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> RingStats {
        RingStats {
            len: self.len(),
            capacity: self.capacity,
            written: self.stats.frames_written.load(Ordering::Relaxed),
            evicted: self.stats.frames_evicted.load(Ordering::Relaxed),
        }
    }
}

/// Indices of `min(n, size)` entries spread evenly over `0..size`.
///
/// With two or more picks the first and last index are always included.
/// A single pick out of several entries selects the newest.
pub fn evenly_spaced_indices(size: usize, n: usize) -> Vec<usize> {
    if n == 0 || size == 0 {
        return Vec::new();
    }
    if size <= n {
        return (0..size).collect();
    }
    if n == 1 {
        return vec![size - 1];
    }
    (0..n).map(|i| i * (size - 1) / (n - 1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(timestamp: f64) -> TimestampedFrame {
        TimestampedFrame::new(timestamp, timestamp.to_string().into_bytes())
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            FrameRing::new(0),
            Err(RelayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let ring = FrameRing::new(3).unwrap();
        for ts in 0..5 {
            ring.push(frame(ts as f64));
        }

        let timestamps: Vec<f64> = ring.snapshot().iter().map(|f| f.timestamp).collect();
        assert_eq!(timestamps, vec![2.0, 3.0, 4.0]);

        let stats = ring.stats();
        assert_eq!(stats.len, 3);
        assert_eq!(stats.written, 5);
        assert_eq!(stats.evicted, 2);
    }

    #[test]
    fn push_reports_eviction() {
        let ring = FrameRing::new(1).unwrap();
        assert!(!ring.push(frame(1.0)));
        assert!(ring.push(frame(2.0)));
        assert_eq!(ring.latest().map(|f| f.timestamp), Some(2.0));
    }

    #[test]
    fn between_is_inclusive_and_ordered() {
        let ring = FrameRing::new(10).unwrap();
        for ts in [1.0, 1.5, 2.0, 2.5, 3.0] {
            ring.push(frame(ts));
        }

        let hits: Vec<f64> = ring.between(1.5, 2.5).iter().map(|f| f.timestamp).collect();
        assert_eq!(hits, vec![1.5, 2.0, 2.5]);
        assert!(ring.between(3.5, 9.0).is_empty());
        assert!(ring.between(2.6, 2.4).is_empty());
    }

    #[test]
    fn spaced_indices_cover_both_ends() {
        assert_eq!(evenly_spaced_indices(7, 3), vec![0, 3, 6]);
        assert_eq!(evenly_spaced_indices(10, 4), vec![0, 3, 6, 9]);
        assert_eq!(evenly_spaced_indices(2, 5), vec![0, 1]);
        assert_eq!(evenly_spaced_indices(5, 1), vec![4]);
        assert!(evenly_spaced_indices(5, 0).is_empty());
        assert!(evenly_spaced_indices(0, 3).is_empty());
    }

    #[test]
    fn spaced_indices_are_strictly_increasing() {
        for size in 1..40 {
            for n in 1..12 {
                let indices = evenly_spaced_indices(size, n);
                assert_eq!(indices.len(), n.min(size));
                assert!(indices.windows(2).all(|w| w[0] < w[1]));
                assert!(indices.iter().all(|&i| i < size));
                if n >= 2 && size >= 2 {
                    assert_eq!(indices.first(), Some(&0));
                    assert_eq!(indices.last(), Some(&(size - 1)));
                }
            }
        }
    }

    #[test]
    fn sample_follows_spaced_indices() {
        let ring = FrameRing::new(10).unwrap();
        for ts in 0..7 {
            ring.push(frame(ts as f64));
        }
        let picked: Vec<f64> = ring.sample(3).iter().map(|f| f.timestamp).collect();
        assert_eq!(picked, vec![0.0, 3.0, 6.0]);
    }
}

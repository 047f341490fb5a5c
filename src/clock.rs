use std::time::{Duration, Instant};

/// Monotonic clock reporting seconds since the relay started.
///
/// Every timestamp stored in a buffer comes from the same clock so ages can
/// be compared directly.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    /// Age of a timestamp relative to now, in seconds
    pub fn age_of(&self, timestamp: f64) -> f64 {
        self.now() - timestamp
    }

    pub fn since(&self, timestamp: f64) -> Duration {
        Duration::from_secs_f64(self.age_of(timestamp).max(0.0))
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(clock.age_of(a) >= 0.0);
        assert_eq!(clock.since(clock.now() + 10.0), Duration::ZERO);
    }
}

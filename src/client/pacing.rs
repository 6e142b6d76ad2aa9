//! Adaptive frame-send pacing
//!
//! The broadcaster tracks how long the external processing collaborator
//! takes to turn a frame around and spaces its sends to match. A short
//! rolling window of round-trip durations feeds a simple feedback loop:
//! the next inter-frame delay is the window mean plus a fixed buffer, never
//! below a floor. This tracks the processor's real throughput instead of
//! flooding it, while still pushing toward the highest sustainable rate.

use std::collections::VecDeque;
use std::time::Duration;

/// Default rolling window length
pub const DEFAULT_WINDOW: usize = 5;

/// Default fixed buffer added to the window mean
pub const DEFAULT_BUFFER: Duration = Duration::from_millis(500);

/// Default lower bound on the inter-frame delay
pub const DEFAULT_FLOOR: Duration = Duration::from_millis(100);

/// Rolling-window frame pacer
#[derive(Debug, Clone)]
pub struct FramePacer {
    window: VecDeque<Duration>,
    window_size: usize,
    buffer: Duration,
    floor: Duration,
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_BUFFER, DEFAULT_FLOOR)
    }
}

impl FramePacer {
    /// Create a pacer with explicit parameters
    pub fn new(window_size: usize, buffer: Duration, floor: Duration) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size.max(1)),
            window_size: window_size.max(1),
            buffer,
            floor,
        }
    }

    /// Record one measured round-trip duration
    pub fn record(&mut self, round_trip: Duration) {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(round_trip);
    }

    /// Recommended delay before the next send
    ///
    /// `max(mean(window) + buffer, floor)`; just the floor until the first
    /// measurement arrives.
    pub fn delay(&self) -> Duration {
        if self.window.is_empty() {
            return self.floor;
        }
        let sum: Duration = self.window.iter().sum();
        let mean = sum / self.window.len() as u32;
        (mean + self.buffer).max(self.floor)
    }

    /// Number of measurements currently in the window
    pub fn samples(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_uses_floor() {
        let pacer = FramePacer::default();
        assert_eq!(pacer.delay(), DEFAULT_FLOOR);
    }

    #[test]
    fn test_delay_is_mean_plus_buffer() {
        let mut pacer = FramePacer::new(5, Duration::from_millis(500), Duration::from_millis(100));
        pacer.record(Duration::from_millis(1_000));
        pacer.record(Duration::from_millis(3_000));

        // mean 2000ms + 500ms buffer
        assert_eq!(pacer.delay(), Duration::from_millis(2_500));
    }

    #[test]
    fn test_floor_applies_to_fast_processors() {
        let mut pacer = FramePacer::new(5, Duration::from_millis(10), Duration::from_millis(100));
        pacer.record(Duration::from_millis(5));
        pacer.record(Duration::from_millis(5));

        assert_eq!(pacer.delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_window_keeps_last_five() {
        let mut pacer = FramePacer::default();
        for _ in 0..3 {
            pacer.record(Duration::from_secs(10));
        }
        // five fast measurements push every slow one out
        for _ in 0..5 {
            pacer.record(Duration::from_millis(200));
        }

        assert_eq!(pacer.samples(), 5);
        assert_eq!(pacer.delay(), Duration::from_millis(700));
    }
}

//! Frame-interval timing between consecutive frame-done callbacks

use super::ring_buffer::RingBuffer;
use std::time::{Duration, Instant};

pub struct FrameTimer {
    last_frame: Option<Instant>,
    intervals: RingBuffer<Duration>,
}

impl FrameTimer {
    pub fn new(capacity: usize) -> Self {
        Self {
            last_frame: None,
            intervals: RingBuffer::new(capacity),
        }
    }

    /// Forget the previous frame so the next tick starts a fresh interval.
    pub fn reset(&mut self) {
        self.last_frame = None;
        self.intervals.clear();
    }

    /// Record a frame presented at `now`.
    pub fn tick(&mut self, now: Instant) {
        if let Some(last) = self.last_frame {
            self.intervals.push(now.saturating_duration_since(last));
        }
        self.last_frame = Some(now);
    }

    pub fn fps(&self) -> f64 {
        let avg = self.intervals.average();
        if avg.as_secs_f64() > 0.0 {
            1.0 / avg.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn frame_time_ms(&self) -> f64 {
        self.intervals.average().as_secs_f64() * 1000.0
    }

    pub fn frame_time_range_ms(&self) -> (f64, f64) {
        let (min, max) = self.intervals.min_max();
        (min.as_secs_f64() * 1000.0, max.as_secs_f64() * 1000.0)
    }
}

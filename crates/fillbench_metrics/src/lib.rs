//! Fillbench Metrics - counters and timers for benchmark runs
//!
//! `Counter` and `SystemProfiler` are always available: a run report needs
//! its frame count and write-time accumulator regardless of build flavour.
//! Frame-interval statistics are heavier (a sample per frame-done callback)
//! and vanish unless the `metrics` feature is enabled.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable frame-interval collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use fillbench_metrics::{Counter, FrameTimer, SystemProfiler};
//!
//! let mut timer = FrameTimer::new(240);
//! let mut profiler = SystemProfiler::new();
//! profiler.time_section("write", || fill(buffer));
//! timer.tick(std::time::Instant::now());
//! println!("jitter range: {:?}", timer.frame_time_range_ms());
//! ```

mod counter;
mod system_profiler;

#[cfg(feature = "metrics")]
mod frame_timer;
#[cfg(feature = "metrics")]
mod ring_buffer;

pub use counter::Counter;
pub use system_profiler::{SectionTiming, SystemProfiler};

#[cfg(feature = "metrics")]
pub use frame_timer::FrameTimer;
#[cfg(feature = "metrics")]
pub use ring_buffer::RingBuffer;

// ============================================================================
// Macros for conditional compilation
// ============================================================================

/// Execute code only when metrics are enabled
#[macro_export]
macro_rules! metrics {
    ($($tt:tt)*) => {
        #[cfg(feature = "metrics")]
        {
            $($tt)*
        }
    };
}

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
pub struct FrameTimer;

#[cfg(not(feature = "metrics"))]
impl FrameTimer {
    pub fn new(_capacity: usize) -> Self { Self }
    pub fn reset(&mut self) {}
    pub fn tick(&mut self, _now: std::time::Instant) {}
    pub fn fps(&self) -> f64 { 0.0 }
    pub fn frame_time_ms(&self) -> f64 { 0.0 }
    pub fn frame_time_range_ms(&self) -> (f64, f64) { (0.0, 0.0) }
}

#[cfg(not(feature = "metrics"))]
pub struct RingBuffer<T>(std::marker::PhantomData<T>);

#[cfg(not(feature = "metrics"))]
impl<T> RingBuffer<T> {
    pub fn new(_capacity: usize) -> Self { Self(std::marker::PhantomData) }
    pub fn push(&mut self, _value: T) {}
    pub fn clear(&mut self) {}
}

//! Clocks and run budgets
//!
//! The harness never reads `Instant::now()` directly so that tests and the
//! simulated compositor can share a manually advanced clock.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Wall-clock budget of one paced run.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(10);

/// Idle time before each run so the compositor settles.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(1);

pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// The process monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Start of a run plus its budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn new(start: Instant, budget: Duration) -> Self {
        Self { start, budget }
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time since the run started, never since the previous frame.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.elapsed(now) >= self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        let before = clock.now();

        other.sleep(Duration::from_millis(250));

        assert_eq!(clock.now() - before, Duration::from_millis(250));
        assert_eq!(clock.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn deadline_measures_from_run_start() {
        let clock = ManualClock::new();
        let deadline = Deadline::new(clock.now(), Duration::from_secs(10));

        clock.advance(Duration::from_secs(9));
        assert!(!deadline.expired(clock.now()));
        assert_eq!(deadline.elapsed(clock.now()), Duration::from_secs(9));

        clock.advance(Duration::from_secs(1));
        assert!(deadline.expired(clock.now()));
    }
}

//! Timed measurement runs

use crate::buffer::Strategy;
use crate::pacer::{FramePacer, PaceTarget, PacerError, Step};
use crate::pool::BufferPool;
use crate::session::Session;
use crate::time::{Clock, Deadline, DEFAULT_BUDGET, DEFAULT_SETTLE};
use crate::workload::Workload;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Wall time a run lasts, checked at every frame callback.
    pub budget: Duration,
    /// Idle time before each run.
    pub settle: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            budget: DEFAULT_BUDGET,
            settle: DEFAULT_SETTLE,
        }
    }
}

/// Result of one paced run, produced once its budget expired.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub strategy: Strategy,
    pub frames: u64,
    pub writes: u64,
    pub submits: u64,
    pub releases: u64,
    pub stale_events: u64,
    /// Total time spent inside the workload.
    pub write_time: Duration,
    /// Run start to the callback that crossed the budget.
    pub elapsed: Duration,
    /// Mean time between frame callbacks; zero without the `metrics` feature.
    pub frame_interval: Duration,
}

impl RunReport {
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    pub fn fps(&self) -> f64 {
        let secs = self.elapsed_secs();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }

    pub fn average_write(&self) -> Duration {
        if self.writes == 0 {
            return Duration::ZERO;
        }
        self.write_time / u32::try_from(self.writes).unwrap_or(u32::MAX)
    }

    pub fn log(&self) {
        tracing::info!(
            strategy = %self.strategy,
            write_ns = self.write_time.as_nanos() as u64,
            writes = self.writes,
            secs = self.elapsed_secs(),
            frames = self.frames,
            fps = self.fps(),
            "run finished"
        );
    }
}

pub struct Harness<C: Clock> {
    clock: C,
    config: HarnessConfig,
}

impl<C: Clock> Harness<C> {
    pub fn new(clock: C, config: HarnessConfig) -> Self {
        Self { clock, config }
    }

    /// Settle, then pace `pool` until the budget expires. Returns on the
    /// first callback past the budget; any session failure aborts the run.
    pub fn run(
        &self,
        pool: &mut BufferPool,
        session: &mut dyn Session,
        workload: &mut dyn Workload,
    ) -> Result<RunReport, PacerError> {
        let strategy = pool.strategy();
        self.clock.sleep(self.config.settle);
        tracing::info!(%strategy, budget = ?self.config.budget, "rendering test");

        let deadline = Deadline::new(self.clock.now(), self.config.budget);
        let mut pacer = FramePacer::new(strategy, deadline);
        let mut target = PaceTarget {
            pool,
            session,
            workload,
        };
        pacer.start(&mut target)?;

        let mut events = Vec::new();
        loop {
            target
                .session
                .dispatch(&mut events)
                .map_err(PacerError::Dispatch)?;

            for event in events.drain(..) {
                if let Step::Finished(report) =
                    pacer.handle_event(event, self.clock.now(), &mut target)?
                {
                    report.log();
                    return Ok(report);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferHandle;
    use crate::memory::HeapAllocator;
    use crate::session::{Damage, SessionError, SessionEvent};
    use crate::sim::SimulatedCompositor;
    use crate::time::ManualClock;
    use crate::workload::PixelTarget;

    const REFRESH: Duration = Duration::from_micros(16_667);

    struct Solid;

    impl Workload for Solid {
        fn fill(&mut self, target: &mut PixelTarget<'_>) {
            target.pixels_mut().fill(0xff);
        }
    }

    fn config() -> HarnessConfig {
        HarnessConfig {
            budget: Duration::from_secs(10),
            settle: Duration::from_secs(1),
        }
    }

    fn run(strategy: Strategy) -> (RunReport, SimulatedCompositor<ManualClock>) {
        let clock = ManualClock::new();
        let harness = Harness::new(clock.clone(), config());
        let mut session = SimulatedCompositor::new(clock, REFRESH);
        let mut pool = BufferPool::allocate(strategy, 32, 16, &mut HeapAllocator::new()).unwrap();

        let report = harness.run(&mut pool, &mut session, &mut Solid).unwrap();
        (report, session)
    }

    #[test]
    fn host_run_reports_after_budget() {
        let (report, session) = run(Strategy::HostMemory);

        assert!(report.frames >= 1);
        assert!(report.elapsed >= Duration::from_secs(10));
        assert!((report.fps() - report.frames as f64 / report.elapsed_secs()).abs() < 1e-9);
        // The last release renders ahead of a callback that ends the run.
        assert_eq!(report.writes, report.submits + 1);
        assert_eq!(session.max_armed_callbacks(), 1);
    }

    #[test]
    fn gpu_run_keeps_up_with_host_run() {
        let (host, _) = run(Strategy::HostMemory);
        let (gpu, session) = run(Strategy::GpuShared);

        assert!(gpu.frames >= host.frames);
        // One primed render beyond the submissions.
        assert_eq!(gpu.writes, gpu.submits + 1);
        assert_eq!(session.max_armed_callbacks(), 1);
    }

    #[test]
    fn fps_is_zero_for_empty_elapsed() {
        let report = RunReport {
            strategy: Strategy::HostMemory,
            frames: 5,
            writes: 0,
            submits: 0,
            releases: 0,
            stale_events: 0,
            write_time: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_interval: Duration::ZERO,
        };
        assert_eq!(report.fps(), 0.0);
        assert_eq!(report.average_write(), Duration::ZERO);
    }

    /// Fails every dispatch, as a dropped connection would.
    struct Disconnected;

    impl Session for Disconnected {
        fn request_frame(&mut self, _buffer: BufferHandle) -> Result<(), SessionError> {
            Ok(())
        }

        fn submit(&mut self, _buffer: BufferHandle, _damage: Damage) -> Result<(), SessionError> {
            Ok(())
        }

        fn dispatch(&mut self, _events: &mut Vec<SessionEvent>) -> Result<(), SessionError> {
            Err(SessionError::connection(
                "dispatch",
                std::io::Error::from(std::io::ErrorKind::BrokenPipe),
            ))
        }
    }

    #[test]
    fn dispatch_failure_aborts_run() {
        let harness = Harness::new(ManualClock::new(), config());
        let mut pool =
            BufferPool::allocate(Strategy::HostMemory, 4, 4, &mut HeapAllocator::new()).unwrap();

        let err = harness
            .run(&mut pool, &mut Disconnected, &mut Solid)
            .unwrap_err();
        assert!(matches!(err, PacerError::Dispatch(_)));
    }
}

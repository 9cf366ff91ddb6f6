//! Frame pacer: the buffer lifecycle state machine
//!
//! Two completion edges drive every submission:
//!
//! - **Release**: the compositor stopped reading a buffer. On the host-memory
//!   path this is the only moment buffer 0 may be rewritten, so a release
//!   renders straight away. With no frame callback outstanding it also
//!   resubmits; otherwise the fresh content waits for the callback.
//! - **Frame done**: the previous frame was presented. Each one counts a
//!   frame and is where the run budget is checked. The host-memory path
//!   submits buffer 0 if it was released and holds unsubmitted content,
//!   rendering first only if the release came after an earlier callback; the
//!   GPU path renders into the cursor buffer, submits the buffer rendered one
//!   step earlier and advances the cursor, without waiting for any release.
//!
//! GPU buffers may be written while the compositor still scans out an older
//! one; the per-write fence is what makes that safe.

use crate::buffer::{BufferHandle, Strategy};
use crate::harness::RunReport;
use crate::pool::BufferPool;
use crate::session::{Damage, Session, SessionError, SessionEvent};
use crate::sync::FenceError;
use crate::time::Deadline;
use crate::workload::Workload;
use fillbench_metrics::{Counter, FrameTimer, SystemProfiler};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Frame intervals kept for jitter statistics.
const FRAME_SAMPLES: usize = 1024;

#[derive(Debug, Error)]
pub enum PacerError {
    #[error("frame callback request for {buffer} failed")]
    FrameRequest {
        buffer: BufferHandle,
        #[source]
        source: SessionError,
    },

    #[error("submitting {buffer} failed")]
    Submit {
        buffer: BufferHandle,
        #[source]
        source: SessionError,
    },

    #[error("write fence on {buffer} failed")]
    Fence {
        buffer: BufferHandle,
        #[source]
        source: FenceError,
    },

    #[error("event dispatch failed")]
    Dispatch(#[source] SessionError),

    #[error("compositor closed the surface mid-run")]
    Closed,
}

/// Everything a pacing step touches, borrowed for the length of one run.
pub struct PaceTarget<'a> {
    pub pool: &'a mut BufferPool,
    pub session: &'a mut dyn Session,
    pub workload: &'a mut dyn Workload,
}

#[derive(Debug)]
pub enum Step {
    Continue,
    Finished(RunReport),
}

pub struct FramePacer {
    strategy: Strategy,
    deadline: Deadline,
    cursor: usize,
    callback_outstanding: bool,
    finished: bool,
    counters: Counter,
    profiler: SystemProfiler,
    frame_timer: FrameTimer,
}

impl FramePacer {
    pub fn new(strategy: Strategy, deadline: Deadline) -> Self {
        Self {
            strategy,
            deadline,
            cursor: 0,
            callback_outstanding: false,
            finished: false,
            counters: Counter::new(),
            profiler: SystemProfiler::new(),
            frame_timer: FrameTimer::new(FRAME_SAMPLES),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Next buffer the GPU path will render into.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn callback_outstanding(&self) -> bool {
        self.callback_outstanding
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn frames(&self) -> u64 {
        self.counters.get("frames")
    }

    pub fn writes(&self) -> u64 {
        self.counters.get("writes")
    }

    /// Kick off the run with the first submission.
    pub fn start(&mut self, target: &mut PaceTarget<'_>) -> Result<(), PacerError> {
        debug_assert_eq!(target.pool.strategy(), self.strategy);
        match self.strategy {
            Strategy::HostMemory => {
                // Anything already in buffer 0 came from outside this run.
                self.render(0, target)?;
                self.pump_host(target)
            }
            Strategy::GpuShared => {
                // Prime one buffer so every later step can submit the buffer
                // rendered on the step before.
                self.render(0, target)?;
                self.cursor = target.pool.next(0);
                self.advance_gpu(target)
            }
        }
    }

    pub fn handle_event(
        &mut self,
        event: SessionEvent,
        now: Instant,
        target: &mut PaceTarget<'_>,
    ) -> Result<Step, PacerError> {
        match event {
            SessionEvent::Closed => Err(PacerError::Closed),
            SessionEvent::Configured => Ok(Step::Continue),
            SessionEvent::Released(handle) | SessionEvent::FrameDone(handle)
                if self.finished || !target.pool.owns(handle) =>
            {
                tracing::trace!(?event, "ignoring event outside this run");
                self.counters.increment("stale_events");
                Ok(Step::Continue)
            }
            SessionEvent::Released(handle) => {
                self.on_release(handle, target)?;
                Ok(Step::Continue)
            }
            SessionEvent::FrameDone(handle) => self.on_frame_done(handle, now, target),
        }
    }

    fn on_release(
        &mut self,
        handle: BufferHandle,
        target: &mut PaceTarget<'_>,
    ) -> Result<(), PacerError> {
        tracing::trace!(%handle, "release");
        target.pool.buffer_mut(handle.index).mark_released();
        self.counters.increment("releases");

        match self.strategy {
            Strategy::HostMemory => self.pump_host(target),
            Strategy::GpuShared => Ok(()),
        }
    }

    fn on_frame_done(
        &mut self,
        handle: BufferHandle,
        now: Instant,
        target: &mut PaceTarget<'_>,
    ) -> Result<Step, PacerError> {
        tracing::trace!(%handle, "frame done");
        target.pool.buffer_mut(handle.index).mark_frame_done();
        self.callback_outstanding = false;
        self.counters.increment("frames");
        self.frame_timer.tick(now);

        if self.deadline.expired(now) {
            self.finished = true;
            return Ok(Step::Finished(self.report(now)));
        }

        match self.strategy {
            Strategy::HostMemory => self.pump_host(target)?,
            Strategy::GpuShared => self.advance_gpu(target)?,
        }
        Ok(Step::Continue)
    }

    /// Host-memory policy: only buffer 0. Rendering needs the release;
    /// submitting also needs no callback in flight.
    fn pump_host(&mut self, target: &mut PaceTarget<'_>) -> Result<(), PacerError> {
        let buffer = target.pool.buffer(0);
        if !buffer.is_released() {
            return Ok(());
        }
        if !buffer.holds_unsubmitted_content() {
            self.render(0, target)?;
        }
        if self.callback_outstanding || !target.pool.buffer(0).is_writable() {
            return Ok(());
        }
        self.submit(0, target)
    }

    fn advance_gpu(&mut self, target: &mut PaceTarget<'_>) -> Result<(), PacerError> {
        let cursor = self.cursor;
        self.render(cursor, target)?;
        self.submit(target.pool.prev(cursor), target)?;
        self.cursor = target.pool.next(cursor);
        Ok(())
    }

    fn render(&mut self, index: usize, target: &mut PaceTarget<'_>) -> Result<(), PacerError> {
        let buffer = target.pool.buffer_mut(index);
        debug_assert!(
            buffer.is_released() || buffer.is_fenced(),
            "unfenced write into compositor-owned {}",
            buffer.handle()
        );

        let start = Instant::now();
        buffer
            .write(&mut *target.workload)
            .map_err(|source| PacerError::Fence {
                buffer: buffer.handle(),
                source,
            })?;
        self.profiler.record("write", start.elapsed());
        self.counters.increment("writes");
        Ok(())
    }

    fn submit(&mut self, index: usize, target: &mut PaceTarget<'_>) -> Result<(), PacerError> {
        let buffer = target.pool.buffer_mut(index);
        let handle = buffer.handle();
        let damage = Damage::full(buffer.width(), buffer.height());

        target
            .session
            .request_frame(handle)
            .map_err(|source| PacerError::FrameRequest {
                buffer: handle,
                source,
            })?;
        target
            .session
            .submit(handle, damage)
            .map_err(|source| PacerError::Submit {
                buffer: handle,
                source,
            })?;

        buffer.mark_submitted();
        self.callback_outstanding = true;
        self.counters.increment("submits");
        tracing::trace!(%handle, "submitted");
        Ok(())
    }

    /// Counters as of `now`. Only meaningful once the budget has expired.
    pub fn report(&self, now: Instant) -> RunReport {
        let write = self.profiler.timing("write");
        fillbench_metrics::metrics! {
            let (min_ms, max_ms) = self.frame_timer.frame_time_range_ms();
            tracing::debug!(
                strategy = %self.strategy,
                avg_ms = self.frame_timer.frame_time_ms(),
                min_ms,
                max_ms,
                "frame interval"
            );
        }

        RunReport {
            strategy: self.strategy,
            frames: self.counters.get("frames"),
            writes: self.counters.get("writes"),
            submits: self.counters.get("submits"),
            releases: self.counters.get("releases"),
            stale_events: self.counters.get("stale_events"),
            write_time: write.total,
            elapsed: self.deadline.elapsed(now),
            frame_interval: Duration::from_secs_f64(self.frame_timer.frame_time_ms() / 1000.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HeapAllocator;
    use crate::sim::SimulatedCompositor;
    use crate::time::{Clock, ManualClock};
    use crate::workload::PixelTarget;

    struct Count(u64);

    impl Workload for Count {
        fn fill(&mut self, target: &mut PixelTarget<'_>) {
            self.0 += 1;
            target.pixels_mut()[0] = self.0 as u8;
        }
    }

    fn pool(strategy: Strategy) -> BufferPool {
        BufferPool::allocate(strategy, 8, 8, &mut HeapAllocator::new()).unwrap()
    }

    fn deadline(clock: &ManualClock, secs: u64) -> Deadline {
        Deadline::new(clock.now(), Duration::from_secs(secs))
    }

    #[test]
    fn host_start_submits_buffer_zero_once() {
        let clock = ManualClock::new();
        let mut pool = pool(Strategy::HostMemory);
        let mut session = SimulatedCompositor::new(clock.clone(), Duration::from_millis(16));
        let mut workload = Count(0);
        let mut pacer = FramePacer::new(Strategy::HostMemory, deadline(&clock, 10));
        let mut target = PaceTarget {
            pool: &mut pool,
            session: &mut session,
            workload: &mut workload,
        };

        pacer.start(&mut target).unwrap();

        assert!(pacer.callback_outstanding());
        assert_eq!(pacer.writes(), 1);
        let buffer = target.pool.buffer(0);
        assert!(buffer.is_submitted() && !buffer.is_released());
        assert!(target.pool.buffer(1).is_writable());
        assert_eq!(session.submitted(), &[BufferHandle::new(Strategy::HostMemory, 0)]);
    }

    #[test]
    fn host_release_renders_ahead_of_outstanding_callback() {
        let clock = ManualClock::new();
        let mut pool = pool(Strategy::HostMemory);
        let mut session = SimulatedCompositor::new(clock.clone(), Duration::from_millis(16));
        let mut workload = Count(0);
        let mut pacer = FramePacer::new(Strategy::HostMemory, deadline(&clock, 10));
        let mut target = PaceTarget {
            pool: &mut pool,
            session: &mut session,
            workload: &mut workload,
        };
        let zero = BufferHandle::new(Strategy::HostMemory, 0);

        pacer.start(&mut target).unwrap();
        pacer
            .handle_event(SessionEvent::Released(zero), clock.now(), &mut target)
            .unwrap();
        assert_eq!(pacer.writes(), 2, "released memory is rendered at once");
        assert!(target.pool.buffer(0).holds_unsubmitted_content());
        assert_eq!(pacer.report(clock.now()).submits, 1, "submission waits for the callback");

        pacer
            .handle_event(SessionEvent::FrameDone(zero), clock.now(), &mut target)
            .unwrap();
        assert_eq!(pacer.frames(), 1);
        assert_eq!(pacer.writes(), 2, "callback submits without rendering again");
        assert!(!target.pool.buffer(0).holds_unsubmitted_content());
        assert_eq!(session.submitted(), &[zero, zero]);
        assert!(pacer.callback_outstanding());
    }

    #[test]
    fn host_start_renders_over_leftover_content() {
        let clock = ManualClock::new();
        let mut pool = pool(Strategy::HostMemory);
        pool.buffer_mut(0).write(&mut Count(100)).unwrap();
        let mut session = SimulatedCompositor::new(clock.clone(), Duration::from_millis(16));
        let mut workload = Count(0);
        let mut pacer = FramePacer::new(Strategy::HostMemory, deadline(&clock, 10));
        let mut target = PaceTarget {
            pool: &mut pool,
            session: &mut session,
            workload: &mut workload,
        };

        pacer.start(&mut target).unwrap();

        assert_eq!(pacer.writes(), 1);
        assert_eq!(target.pool.buffer(0).pixels()[0], 1);
    }

    #[test]
    fn host_callback_before_release_defers_to_release() {
        let clock = ManualClock::new();
        let mut pool = pool(Strategy::HostMemory);
        let mut session = SimulatedCompositor::new(clock.clone(), Duration::from_millis(16));
        let mut workload = Count(0);
        let mut pacer = FramePacer::new(Strategy::HostMemory, deadline(&clock, 10));
        let mut target = PaceTarget {
            pool: &mut pool,
            session: &mut session,
            workload: &mut workload,
        };
        let zero = BufferHandle::new(Strategy::HostMemory, 0);

        pacer.start(&mut target).unwrap();
        pacer
            .handle_event(SessionEvent::FrameDone(zero), clock.now(), &mut target)
            .unwrap();
        assert_eq!(pacer.writes(), 1, "buffer still held by the compositor");
        assert!(!pacer.callback_outstanding());

        pacer
            .handle_event(SessionEvent::Released(zero), clock.now(), &mut target)
            .unwrap();
        assert_eq!(pacer.writes(), 2);
        assert!(pacer.callback_outstanding());
    }

    #[test]
    fn gpu_renders_one_ahead_of_submission() {
        let clock = ManualClock::new();
        let mut pool = pool(Strategy::GpuShared);
        let mut session = SimulatedCompositor::new(clock.clone(), Duration::from_millis(16));
        let mut workload = Count(0);
        let mut pacer = FramePacer::new(Strategy::GpuShared, deadline(&clock, 10));
        let mut target = PaceTarget {
            pool: &mut pool,
            session: &mut session,
            workload: &mut workload,
        };
        let handle = |index| BufferHandle::new(Strategy::GpuShared, index);

        pacer.start(&mut target).unwrap();
        assert_eq!(pacer.writes(), 2);
        assert_eq!(pacer.cursor(), 2);

        pacer
            .handle_event(SessionEvent::FrameDone(handle(0)), clock.now(), &mut target)
            .unwrap();
        pacer
            .handle_event(SessionEvent::FrameDone(handle(1)), clock.now(), &mut target)
            .unwrap();

        assert_eq!(pacer.writes(), 4);
        assert_eq!(pacer.cursor(), 1);
        assert_eq!(session.submitted(), &[handle(0), handle(1), handle(2)]);
    }

    #[test]
    fn gpu_ignores_release_for_pacing() {
        let clock = ManualClock::new();
        let mut pool = pool(Strategy::GpuShared);
        let mut session = SimulatedCompositor::new(clock.clone(), Duration::from_millis(16));
        let mut workload = Count(0);
        let mut pacer = FramePacer::new(Strategy::GpuShared, deadline(&clock, 10));
        let mut target = PaceTarget {
            pool: &mut pool,
            session: &mut session,
            workload: &mut workload,
        };

        pacer.start(&mut target).unwrap();
        let step = pacer
            .handle_event(
                SessionEvent::Released(BufferHandle::new(Strategy::GpuShared, 0)),
                clock.now(),
                &mut target,
            )
            .unwrap();

        assert!(matches!(step, Step::Continue));
        assert_eq!(pacer.writes(), 2);
        assert!(target.pool.buffer(0).is_writable());
    }

    #[test]
    fn events_for_other_pool_are_counted_not_applied() {
        let clock = ManualClock::new();
        let mut pool = pool(Strategy::GpuShared);
        let mut session = SimulatedCompositor::new(clock.clone(), Duration::from_millis(16));
        let mut workload = Count(0);
        let mut pacer = FramePacer::new(Strategy::GpuShared, deadline(&clock, 10));
        let mut target = PaceTarget {
            pool: &mut pool,
            session: &mut session,
            workload: &mut workload,
        };

        pacer.start(&mut target).unwrap();
        pacer
            .handle_event(
                SessionEvent::FrameDone(BufferHandle::new(Strategy::HostMemory, 0)),
                clock.now(),
                &mut target,
            )
            .unwrap();

        assert_eq!(pacer.frames(), 0);
        assert_eq!(pacer.report(clock.now()).stale_events, 1);
    }

    #[test]
    fn budget_expiry_stops_without_new_submission() {
        let clock = ManualClock::new();
        let mut pool = pool(Strategy::HostMemory);
        let mut session = SimulatedCompositor::new(clock.clone(), Duration::from_millis(16));
        let mut workload = Count(0);
        let mut pacer = FramePacer::new(Strategy::HostMemory, deadline(&clock, 1));
        let mut target = PaceTarget {
            pool: &mut pool,
            session: &mut session,
            workload: &mut workload,
        };
        let zero = BufferHandle::new(Strategy::HostMemory, 0);

        pacer.start(&mut target).unwrap();
        pacer
            .handle_event(SessionEvent::Released(zero), clock.now(), &mut target)
            .unwrap();
        clock.advance(Duration::from_secs(2));
        let step = pacer
            .handle_event(SessionEvent::FrameDone(zero), clock.now(), &mut target)
            .unwrap();

        let Step::Finished(report) = step else {
            panic!("expected the run to finish");
        };
        assert_eq!(report.frames, 1);
        assert_eq!(report.submits, 1);
        assert_eq!(report.elapsed, Duration::from_secs(2));
        assert!(pacer.is_finished());
    }

    #[test]
    fn close_is_fatal() {
        let clock = ManualClock::new();
        let mut pool = pool(Strategy::HostMemory);
        let mut session = SimulatedCompositor::new(clock.clone(), Duration::from_millis(16));
        let mut workload = Count(0);
        let mut pacer = FramePacer::new(Strategy::HostMemory, deadline(&clock, 1));
        let mut target = PaceTarget {
            pool: &mut pool,
            session: &mut session,
            workload: &mut workload,
        };

        let err = pacer
            .handle_event(SessionEvent::Closed, clock.now(), &mut target)
            .unwrap_err();
        assert!(matches!(err, PacerError::Closed));
    }
}

//! The bench context: one session, one pool per strategy, one harness
//!
//! Built once at startup and owned by the caller. Both strategy runs borrow
//! from it in turn; nothing is shared through process-wide state.

use crate::buffer::Strategy;
use crate::harness::{Harness, RunReport};
use crate::memory::Allocator;
use crate::pacer::PacerError;
use crate::pool::{BufferPool, PoolError};
use crate::session::Session;
use crate::time::Clock;
use crate::workload::Workload;

pub struct Bench<S: Session, C: Clock> {
    session: S,
    host: BufferPool,
    gpu: BufferPool,
    harness: Harness<C>,
}

impl<S: Session, C: Clock> Bench<S, C> {
    /// Allocate both pools up front. Any allocation failure returns before
    /// the session has seen a single commit.
    pub fn new(
        session: S,
        allocator: &mut dyn Allocator,
        width: u32,
        height: u32,
        harness: Harness<C>,
    ) -> Result<Self, PoolError> {
        let host = BufferPool::allocate(Strategy::HostMemory, width, height, allocator)?;
        let gpu = BufferPool::allocate(Strategy::GpuShared, width, height, allocator)?;
        Ok(Self {
            session,
            host,
            gpu,
            harness,
        })
    }

    /// Variant for backends whose session is also the allocator.
    pub fn with_session_allocator(
        mut session: S,
        width: u32,
        height: u32,
        harness: Harness<C>,
    ) -> Result<Self, PoolError>
    where
        S: Allocator,
    {
        let host = BufferPool::allocate(Strategy::HostMemory, width, height, &mut session)?;
        let gpu = BufferPool::allocate(Strategy::GpuShared, width, height, &mut session)?;
        Ok(Self {
            session,
            host,
            gpu,
            harness,
        })
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn pool_mut(&mut self, strategy: Strategy) -> &mut BufferPool {
        match strategy {
            Strategy::HostMemory => &mut self.host,
            Strategy::GpuShared => &mut self.gpu,
        }
    }

    /// One timed run over the pool of `strategy`.
    pub fn run(
        &mut self,
        strategy: Strategy,
        workload: &mut dyn Workload,
    ) -> Result<RunReport, PacerError> {
        let pool = match strategy {
            Strategy::HostMemory => &mut self.host,
            Strategy::GpuShared => &mut self.gpu,
        };
        self.harness.run(pool, &mut self.session, workload)
    }

    /// Host-memory run, then GPU-shared run, in that order.
    pub fn run_all(&mut self, workload: &mut dyn Workload) -> Result<Vec<RunReport>, PacerError> {
        Strategy::ALL
            .iter()
            .map(|&strategy| self.run(strategy, workload))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferHandle;
    use crate::harness::HarnessConfig;
    use crate::memory::{AllocError, Allocation, HeapAllocator};
    use crate::sim::SimulatedCompositor;
    use crate::time::ManualClock;
    use crate::workload::PixelTarget;
    use std::time::Duration;

    struct Noop;

    impl Workload for Noop {
        fn fill(&mut self, _target: &mut PixelTarget<'_>) {}
    }

    /// Rejects every GPU-shared buffer.
    struct NoGpu(HeapAllocator);

    impl Allocator for NoGpu {
        fn allocate(
            &mut self,
            handle: BufferHandle,
            width: u32,
            height: u32,
        ) -> Result<Allocation, AllocError> {
            match handle.strategy {
                Strategy::HostMemory => self.0.allocate(handle, width, height),
                Strategy::GpuShared => Err(AllocError::Unsupported {
                    strategy: handle.strategy,
                }),
            }
        }
    }

    fn harness(clock: &ManualClock) -> Harness<ManualClock> {
        Harness::new(
            clock.clone(),
            HarnessConfig {
                budget: Duration::from_secs(2),
                settle: Duration::from_millis(100),
            },
        )
    }

    #[test]
    fn runs_host_then_gpu() {
        let clock = ManualClock::new();
        let session = SimulatedCompositor::new(clock.clone(), Duration::from_millis(16));
        let mut bench =
            Bench::new(session, &mut HeapAllocator::new(), 16, 16, harness(&clock)).unwrap();

        let reports = bench.run_all(&mut Noop).unwrap();

        let strategies: Vec<_> = reports.iter().map(|report| report.strategy).collect();
        assert_eq!(strategies, Strategy::ALL);
        assert!(reports.iter().all(|report| report.frames >= 1));
        assert!(reports[1].frames >= reports[0].frames);

        let submitted = bench.session().submitted();
        assert_eq!(submitted[0], BufferHandle::new(Strategy::HostMemory, 0));
        assert_eq!(
            submitted.last().map(|handle| handle.strategy),
            Some(Strategy::GpuShared)
        );
    }

    #[test]
    fn failed_allocation_never_reaches_the_session() {
        let clock = ManualClock::new();
        let mut session = SimulatedCompositor::new(clock.clone(), Duration::from_millis(16));

        let err = match Bench::new(
            &mut session,
            &mut NoGpu(HeapAllocator::new()),
            16,
            16,
            harness(&clock),
        ) {
            Ok(_) => panic!("GPU allocation should have failed"),
            Err(err) => err,
        };

        assert!(matches!(
            err,
            PoolError::Allocation {
                strategy: Strategy::GpuShared,
                index: 0,
                ..
            }
        ));
        assert!(session.submitted().is_empty());
    }
}

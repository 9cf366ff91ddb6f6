//! Fixed-size buffer pools and round-robin index arithmetic

use crate::buffer::{Buffer, BufferHandle, Strategy};
use crate::memory::{AllocError, Allocator};
use thiserror::Error;

/// Buffers per strategy.
pub const POOL_SIZE: usize = 3;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("buffer size {width}x{height} is empty")]
    EmptySize { width: u32, height: u32 },

    #[error("failed to allocate {strategy} buffer {index}")]
    Allocation {
        strategy: Strategy,
        index: usize,
        #[source]
        source: AllocError,
    },
}

/// Slot after `i` in a ring of `len`.
#[inline]
pub fn next(i: usize, len: usize) -> usize {
    (i + 1) % len
}

/// Slot before `i` in a ring of `len`.
#[inline]
pub fn prev(i: usize, len: usize) -> usize {
    (i + len - 1) % len
}

/// Owns every buffer of one strategy. Nothing is allocated or freed after
/// construction.
#[derive(Debug)]
pub struct BufferPool {
    strategy: Strategy,
    buffers: Vec<Buffer>,
}

impl BufferPool {
    /// Allocate `POOL_SIZE` buffers. Either every buffer is created or the
    /// partial set is dropped and the error returned.
    pub fn allocate(
        strategy: Strategy,
        width: u32,
        height: u32,
        allocator: &mut dyn Allocator,
    ) -> Result<Self, PoolError> {
        Self::with_len(strategy, width, height, POOL_SIZE, allocator)
    }

    pub fn with_len(
        strategy: Strategy,
        width: u32,
        height: u32,
        len: usize,
        allocator: &mut dyn Allocator,
    ) -> Result<Self, PoolError> {
        if width == 0 || height == 0 {
            return Err(PoolError::EmptySize { width, height });
        }

        let buffers = (0..len)
            .map(|index| {
                let handle = BufferHandle::new(strategy, index);
                allocator
                    .allocate(handle, width, height)
                    .and_then(|allocation| Buffer::new(handle, width, height, allocation))
                    .map_err(|source| PoolError::Allocation {
                        strategy,
                        index,
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(%strategy, len, width, height, "buffer pool ready");
        Ok(Self { strategy, buffers })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn buffer(&self, index: usize) -> &Buffer {
        &self.buffers[index]
    }

    pub fn buffer_mut(&mut self, index: usize) -> &mut Buffer {
        &mut self.buffers[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter()
    }

    /// Whether `handle` names a buffer of this pool.
    pub fn owns(&self, handle: BufferHandle) -> bool {
        handle.strategy == self.strategy && handle.index < self.buffers.len()
    }

    /// First buffer the client may write, or `None` when the compositor holds
    /// them all. Never waits: the caller retries after the next event.
    pub fn acquire_writable(&mut self) -> Option<&mut Buffer> {
        self.buffers.iter_mut().find(|buffer| buffer.is_writable())
    }

    pub fn next(&self, index: usize) -> usize {
        next(index, self.buffers.len())
    }

    pub fn prev(&self, index: usize) -> usize {
        prev(index, self.buffers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Allocation, HeapAllocator};
    use proptest::prelude::{prop_assert_eq, proptest};

    /// Succeeds `remaining` times, then fails.
    struct FailingAllocator {
        inner: HeapAllocator,
        remaining: usize,
    }

    impl Allocator for FailingAllocator {
        fn allocate(
            &mut self,
            handle: BufferHandle,
            width: u32,
            height: u32,
        ) -> Result<Allocation, AllocError> {
            if self.remaining == 0 {
                return Err(AllocError::Os {
                    op: "mmap",
                    source: std::io::Error::from_raw_os_error(12),
                });
            }
            self.remaining -= 1;
            self.inner.allocate(handle, width, height)
        }
    }

    #[test]
    fn ring_index_matches_modular_arithmetic() {
        assert_eq!(next(0, 3), 1);
        assert_eq!(next(2, 3), 0);
        assert_eq!(prev(0, 3), 2);
        assert_eq!(prev(1, 3), 0);
    }

    proptest! {
        #[test]
        fn next_three_times_is_identity(i in 0usize..POOL_SIZE) {
            prop_assert_eq!(next(next(next(i, POOL_SIZE), POOL_SIZE), POOL_SIZE), i);
        }

        #[test]
        fn prev_undoes_next(i in 0usize..64, len in 1usize..64) {
            let i = i % len;
            prop_assert_eq!(prev(next(i, len), len), i);
            prop_assert_eq!(prev(i, len), (i + len - 1) % len);
        }
    }

    #[test]
    fn allocates_fixed_pool() {
        let mut allocator = HeapAllocator::new();
        let pool = BufferPool::allocate(Strategy::GpuShared, 16, 8, &mut allocator).unwrap();

        assert_eq!(pool.len(), POOL_SIZE);
        assert!(pool.iter().all(|b| b.is_fenced()));
        assert!(pool.owns(BufferHandle::new(Strategy::GpuShared, 2)));
        assert!(!pool.owns(BufferHandle::new(Strategy::HostMemory, 0)));
        assert!(!pool.owns(BufferHandle::new(Strategy::GpuShared, 3)));
    }

    #[test]
    fn acquire_returns_none_when_all_submitted() {
        let mut allocator = HeapAllocator::new();
        let mut pool = BufferPool::allocate(Strategy::HostMemory, 4, 4, &mut allocator).unwrap();

        for index in 0..pool.len() {
            pool.buffer_mut(index).mark_submitted();
        }
        assert!(pool.iter().all(|b| b.is_submitted() && !b.is_released()));
        assert!(pool.acquire_writable().is_none());

        pool.buffer_mut(1).mark_released();
        pool.buffer_mut(1).mark_frame_done();
        assert_eq!(pool.acquire_writable().map(|b| b.index()), Some(1));
    }

    #[test]
    fn partial_allocation_is_not_reachable() {
        let mut allocator = FailingAllocator {
            inner: HeapAllocator::new(),
            remaining: 2,
        };
        let err = BufferPool::allocate(Strategy::GpuShared, 4, 4, &mut allocator).unwrap_err();

        assert!(matches!(
            err,
            PoolError::Allocation {
                strategy: Strategy::GpuShared,
                index: 2,
                ..
            }
        ));
    }

    #[test]
    fn empty_size_is_rejected() {
        let mut allocator = HeapAllocator::new();
        let err = BufferPool::allocate(Strategy::HostMemory, 0, 4, &mut allocator).unwrap_err();
        assert!(matches!(err, PoolError::EmptySize { .. }));
        assert_eq!(allocator.allocated(), 0);
    }
}

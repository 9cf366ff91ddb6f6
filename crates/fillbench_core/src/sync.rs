//! Write fences for GPU-shared buffers
//!
//! Every CPU write into a buffer that display hardware may read concurrently
//! is bracketed by `begin_write`/`end_write`. `SyncGuard` makes the pairing
//! structural: the end fence is issued on drop if `finish` was never reached.

use std::cell::Cell;
use std::io;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FenceError {
    #[error("{op} fence ioctl failed")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("write fence is already open")]
    AlreadyOpen,

    #[error("end-of-write fence without a matching begin")]
    NotOpen,
}

pub trait WriteFence {
    fn begin_write(&self) -> Result<(), FenceError>;
    fn end_write(&self) -> Result<(), FenceError>;
}

/// Holds a write fence open for its lifetime.
#[must_use = "dropping the guard immediately closes the write fence"]
pub struct SyncGuard<'a> {
    fence: &'a dyn WriteFence,
    open: bool,
}

impl<'a> SyncGuard<'a> {
    pub fn begin(fence: &'a dyn WriteFence) -> Result<Self, FenceError> {
        fence.begin_write()?;
        Ok(Self { fence, open: true })
    }

    /// Close the fence and surface its error.
    pub fn finish(mut self) -> Result<(), FenceError> {
        self.open = false;
        self.fence.end_write()
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(err) = self.fence.end_write() {
                tracing::error!(%err, "end-of-write fence failed while unwinding");
            }
        }
    }
}

/// Bracket bookkeeping shared between a `SoftFence` and its observers.
#[derive(Debug, Default)]
pub struct FenceStats {
    open: Cell<bool>,
    begins: Cell<u64>,
    ends: Cell<u64>,
}

impl FenceStats {
    pub fn is_open(&self) -> bool {
        self.open.get()
    }

    pub fn begins(&self) -> u64 {
        self.begins.get()
    }

    pub fn ends(&self) -> u64 {
        self.ends.get()
    }
}

/// In-process fence for heap-backed "GPU" buffers. It has no memory effect
/// but enforces strict begin/end alternation.
#[derive(Debug, Clone, Default)]
pub struct SoftFence {
    stats: Rc<FenceStats>,
}

impl SoftFence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Rc<FenceStats> {
        Rc::clone(&self.stats)
    }
}

impl WriteFence for SoftFence {
    fn begin_write(&self) -> Result<(), FenceError> {
        if self.stats.open.replace(true) {
            return Err(FenceError::AlreadyOpen);
        }
        self.stats.begins.set(self.stats.begins.get() + 1);
        Ok(())
    }

    fn end_write(&self) -> Result<(), FenceError> {
        if !self.stats.open.replace(false) {
            return Err(FenceError::NotOpen);
        }
        self.stats.ends.set(self.stats.ends.get() + 1);
        Ok(())
    }
}

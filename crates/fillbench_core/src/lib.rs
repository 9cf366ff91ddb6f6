//! Fillbench Core
//!
//! The buffer lifecycle and frame-pacing machinery shared by every backend:
//! - Buffers, pools and the round-robin index ring
//! - Write fences and the RAII guard that brackets GPU-buffer writes
//! - The session/allocator/workload seams a backend plugs into
//! - The frame pacer state machine and the timed measurement harness
//! - A simulated compositor for headless runs and tests

pub mod bench;
pub mod buffer;
pub mod harness;
pub mod memory;
pub mod pacer;
pub mod pool;
pub mod session;
pub mod sim;
pub mod sync;
pub mod time;
pub mod workload;

pub use bench::Bench;
pub use buffer::{Buffer, BufferHandle, Strategy};
pub use harness::{Harness, HarnessConfig, RunReport};
pub use memory::{AllocError, Allocation, Allocator, HeapAllocator, HeapMemory, PixelMemory};
pub use pacer::{FramePacer, PaceTarget, PacerError, Step};
pub use pool::{BufferPool, PoolError, POOL_SIZE};
pub use session::{Damage, Session, SessionError, SessionEvent};
pub use sim::SimulatedCompositor;
pub use sync::{FenceError, SoftFence, SyncGuard, WriteFence};
pub use time::{Clock, Deadline, ManualClock, MonotonicClock};
pub use workload::{PixelTarget, Workload};

/// Bench version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

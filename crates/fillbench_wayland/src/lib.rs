//! Fillbench Wayland Backend
//!
//! A raw-protocol Wayland client that implements the core `Session` and
//! `Allocator` seams:
//! - `wl_shm` buffers over memfd mappings for the host-memory pool
//! - GBM buffer objects imported through `zwp_linux_dmabuf_v1` for the
//!   GPU-shared pool, fenced with `DMA_BUF_IOCTL_SYNC`
//! - An xdg toplevel whose buffer releases and frame callbacks become
//!   `SessionEvent`s

pub mod error;
pub mod fence;
pub mod mapping;
pub mod session;
mod state;

pub use error::WaylandError;
pub use fence::DmaBufFence;
pub use mapping::MappedRegion;
pub use session::{WaylandConfig, WaylandSession};

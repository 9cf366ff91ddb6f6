//! A single shareable pixel buffer and its lifecycle flags

use crate::memory::{AllocError, Allocation, PixelMemory};
use crate::sync::{FenceError, SyncGuard, WriteFence};
use crate::workload::{PixelTarget, Workload};
use std::fmt;

/// How a pool's buffers are shared with the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strategy {
    /// File-descriptor backed shared memory, no hardware fence.
    HostMemory,
    /// GPU allocator memory imported as a DMA-BUF, fenced per write.
    GpuShared,
}

impl Strategy {
    pub const ALL: [Strategy; 2] = [Strategy::HostMemory, Strategy::GpuShared];

    pub fn label(self) -> &'static str {
        match self {
            Strategy::HostMemory => "SHM",
            Strategy::GpuShared => "DMA",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Protocol-visible identity of a buffer: which pool, which slot.
///
/// Backends key their protocol objects by this and hand it back in events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle {
    pub strategy: Strategy,
    pub index: usize,
}

impl BufferHandle {
    pub fn new(strategy: Strategy, index: usize) -> Self {
        Self { strategy, index }
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.strategy, self.index)
    }
}

pub struct Buffer {
    handle: BufferHandle,
    width: u32,
    height: u32,
    stride: u32,
    memory: Box<dyn PixelMemory>,
    fence: Option<Box<dyn WriteFence>>,
    released: bool,
    submitted: bool,
    callback_pending: bool,
    rendered: bool,
}

impl Buffer {
    pub fn new(
        handle: BufferHandle,
        width: u32,
        height: u32,
        allocation: Allocation,
    ) -> Result<Self, AllocError> {
        let Allocation {
            stride,
            memory,
            fence,
        } = allocation;

        let row_bytes = width as usize * 4;
        let needed = stride as usize * height as usize;
        if (stride as usize) < row_bytes || memory.len() < needed {
            return Err(AllocError::Layout {
                width,
                height,
                stride,
                len: memory.len(),
            });
        }

        Ok(Self {
            handle,
            width,
            height,
            stride,
            memory,
            fence,
            released: true,
            submitted: false,
            callback_pending: false,
            rendered: false,
        })
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn index(&self) -> usize {
        self.handle.index
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn mapped_size(&self) -> usize {
        self.memory.len()
    }

    pub fn pixels(&self) -> &[u8] {
        self.memory.as_slice()
    }

    pub fn is_fenced(&self) -> bool {
        self.fence.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn is_callback_pending(&self) -> bool {
        self.callback_pending
    }

    /// Written since its last submission.
    pub fn holds_unsubmitted_content(&self) -> bool {
        self.rendered
    }

    /// The compositor holds no claim on this buffer's memory.
    pub fn is_writable(&self) -> bool {
        self.released && !self.submitted
    }

    /// Run `workload` over the pixels. Fenced buffers get exactly one
    /// begin/end pair around the whole fill.
    pub fn write(&mut self, workload: &mut dyn Workload) -> Result<(), FenceError> {
        let len = self.stride as usize * self.height as usize;
        let pixels = &mut self.memory.as_mut_slice()[..len];
        let mut target = PixelTarget::new(pixels, self.width, self.height, self.stride);

        match self.fence.as_deref() {
            Some(fence) => {
                let guard = SyncGuard::begin(fence)?;
                workload.fill(&mut target);
                guard.finish()?;
            }
            None => workload.fill(&mut target),
        }
        self.rendered = true;
        Ok(())
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.submitted = true;
        self.released = false;
        self.callback_pending = true;
        self.rendered = false;
    }

    /// Release edge. GPU buffers also leave `submitted` here: their reuse is
    /// fenced per write, not gated on the frame callback.
    pub(crate) fn mark_released(&mut self) {
        self.released = true;
        if self.handle.strategy == Strategy::GpuShared {
            self.submitted = false;
        }
    }

    /// Callback edge. Host-memory buffers become reusable once both edges
    /// have fired.
    pub(crate) fn mark_frame_done(&mut self) {
        self.callback_pending = false;
        if self.handle.strategy == Strategy::HostMemory {
            self.submitted = false;
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("handle", &self.handle)
            .field("size", &(self.width, self.height))
            .field("stride", &self.stride)
            .field("released", &self.released)
            .field("submitted", &self.submitted)
            .field("callback_pending", &self.callback_pending)
            .field("rendered", &self.rendered)
            .finish_non_exhaustive()
    }
}

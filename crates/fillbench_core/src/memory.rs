//! Pixel memory and the allocator seam

use crate::buffer::{BufferHandle, Strategy};
use crate::sync::{SoftFence, WriteFence};
use std::io;
use thiserror::Error;

/// Writable memory behind one buffer.
pub trait PixelMemory {
    fn len(&self) -> usize;
    fn as_slice(&self) -> &[u8];
    fn as_mut_slice(&mut self) -> &mut [u8];

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What an allocator hands back for one buffer. Any protocol object created
/// for it stays with the allocator, keyed by the buffer handle.
pub struct Allocation {
    pub stride: u32,
    pub memory: Box<dyn PixelMemory>,
    pub fence: Option<Box<dyn WriteFence>>,
}

#[derive(Debug, Error)]
pub enum AllocError {
    #[error("{strategy} buffers are not supported by this backend")]
    Unsupported { strategy: Strategy },

    #[error("{op} failed")]
    Os {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("compositor rejected {op}: {reason}")]
    Protocol { op: &'static str, reason: String },

    #[error("buffer layout {width}x{height} stride {stride} does not fit {len} mapped bytes")]
    Layout {
        width: u32,
        height: u32,
        stride: u32,
        len: usize,
    },
}

pub trait Allocator {
    fn allocate(
        &mut self,
        handle: BufferHandle,
        width: u32,
        height: u32,
    ) -> Result<Allocation, AllocError>;
}

/// Heap pixels, word-aligned so rows can be viewed as `u32` pixels.
#[derive(Debug, Clone)]
pub struct HeapMemory {
    words: Vec<u32>,
    len: usize,
}

impl HeapMemory {
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(4)],
            len,
        }
    }
}

impl PixelMemory for HeapMemory {
    fn len(&self) -> usize {
        self.len
    }

    fn as_slice(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.len]
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.len]
    }
}

/// Allocates heap buffers for headless runs. GPU-strategy buffers get a
/// `SoftFence` so write bracketing is still enforced.
#[derive(Debug, Default)]
pub struct HeapAllocator {
    allocated: usize,
}

impl HeapAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocated(&self) -> usize {
        self.allocated
    }
}

impl Allocator for HeapAllocator {
    fn allocate(
        &mut self,
        handle: BufferHandle,
        width: u32,
        height: u32,
    ) -> Result<Allocation, AllocError> {
        let stride = width.checked_mul(4).ok_or(AllocError::Layout {
            width,
            height,
            stride: 0,
            len: 0,
        })?;
        let fence: Option<Box<dyn WriteFence>> = match handle.strategy {
            Strategy::HostMemory => None,
            Strategy::GpuShared => Some(Box::new(SoftFence::new())),
        };

        self.allocated += 1;
        tracing::debug!(%handle, width, height, stride, "allocated heap buffer");

        Ok(Allocation {
            stride,
            memory: Box::new(HeapMemory::zeroed(stride as usize * height as usize)),
            fence,
        })
    }
}

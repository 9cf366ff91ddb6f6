//! CPU access fences on DMA-BUF file descriptors

use fillbench_core::{FenceError, WriteFence};
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};

pub const DMA_BUF_SYNC_READ: u64 = 1;
pub const DMA_BUF_SYNC_WRITE: u64 = 2;
pub const DMA_BUF_SYNC_START: u64 = 0;
pub const DMA_BUF_SYNC_END: u64 = 4;

/// `_IOW('b', 0, struct dma_buf_sync)`
const DMA_BUF_IOCTL_SYNC: u64 = 0x4008_6200;

#[repr(C)]
struct DmaBufSync {
    flags: u64,
}

/// Brackets CPU writes into a GPU-shared buffer.
pub struct DmaBufFence {
    fd: OwnedFd,
}

impl DmaBufFence {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    fn sync(&self, op: &'static str, flags: u64) -> Result<(), FenceError> {
        let mut arg = DmaBufSync { flags };
        loop {
            let ret = unsafe {
                libc::ioctl(
                    self.fd.as_raw_fd(),
                    DMA_BUF_IOCTL_SYNC as _,
                    &mut arg as *mut DmaBufSync,
                )
            };
            if ret == 0 {
                return Ok(());
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
                _ => return Err(FenceError::Io { op, source: err }),
            }
        }
    }
}

impl WriteFence for DmaBufFence {
    fn begin_write(&self) -> Result<(), FenceError> {
        self.sync("begin write", DMA_BUF_SYNC_START | DMA_BUF_SYNC_WRITE)
    }

    fn end_write(&self) -> Result<(), FenceError> {
        self.sync("end write", DMA_BUF_SYNC_END | DMA_BUF_SYNC_WRITE)
    }
}

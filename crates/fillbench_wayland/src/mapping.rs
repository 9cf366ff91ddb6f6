//! Shared memory mappings of file descriptors

use fillbench_core::{AllocError, PixelMemory};
use std::ffi::CStr;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::ptr;

/// Anonymous memfd of `len` bytes, close-on-exec.
pub fn create_memfd(name: &CStr, len: usize) -> Result<OwnedFd, AllocError> {
    let raw = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
    if raw < 0 {
        return Err(AllocError::Os {
            op: "memfd_create",
            source: io::Error::last_os_error(),
        });
    }
    // SAFETY: `raw` is a freshly created descriptor nobody else owns.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    let size = libc::off_t::try_from(len).map_err(|_| AllocError::Os {
        op: "ftruncate",
        source: io::Error::from(io::ErrorKind::InvalidInput),
    })?;
    if unsafe { libc::ftruncate(fd.as_raw_fd(), size) } < 0 {
        return Err(AllocError::Os {
            op: "ftruncate",
            source: io::Error::last_os_error(),
        });
    }
    Ok(fd)
}

/// Protections tried in order. Some DMA-BUF exporters refuse readable
/// mappings; writing is all the bench needs.
const PROTECTIONS: [libc::c_int; 2] = [libc::PROT_READ | libc::PROT_WRITE, libc::PROT_WRITE];

/// A `MAP_SHARED` mapping, unmapped on drop. Keeps its file descriptor open
/// for as long as the mapping lives.
pub struct MappedRegion {
    fd: OwnedFd,
    ptr: *mut u8,
    len: usize,
    protection: libc::c_int,
}

impl MappedRegion {
    pub fn map(fd: OwnedFd, len: usize) -> Result<Self, AllocError> {
        let mut last_error = io::Error::from(io::ErrorKind::InvalidInput);
        for protection in PROTECTIONS {
            let ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    len,
                    protection,
                    libc::MAP_SHARED,
                    fd.as_raw_fd(),
                    0,
                )
            };
            if ptr != libc::MAP_FAILED {
                return Ok(Self {
                    fd,
                    ptr: ptr.cast::<u8>(),
                    len,
                    protection,
                });
            }

            last_error = io::Error::last_os_error();
            tracing::debug!(protection, err = %last_error, "mmap refused");
        }

        Err(AllocError::Os {
            op: "mmap",
            source: last_error,
        })
    }

    pub fn fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    /// False when only the write-only fallback mapping succeeded.
    pub fn is_readable(&self) -> bool {
        self.protection & libc::PROT_READ != 0
    }
}

impl PixelMemory for MappedRegion {
    fn len(&self) -> usize {
        self.len
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping is `len` bytes and lives until drop.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above; `&mut self` makes the borrow unique.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.cast::<libc::c_void>(), self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memfd_mapping_is_writable_and_shared() {
        let fd = create_memfd(c"fillbench-test", 4096).unwrap();
        let dup = fd.try_clone().unwrap();
        let mut first = MappedRegion::map(fd, 4096).unwrap();
        let second = MappedRegion::map(dup, 4096).unwrap();

        first.as_mut_slice()[100] = 0x5a;

        assert_eq!(first.len(), 4096);
        assert!(first.is_readable());
        assert_eq!(second.as_slice()[100], 0x5a);
    }

    #[test]
    fn unmappable_fd_reports_last_error() {
        let fd = OwnedFd::from(std::fs::File::open("/dev/null").unwrap());
        let err = MappedRegion::map(fd, 4096).err().unwrap();
        assert!(matches!(err, AllocError::Os { op: "mmap", .. }));
    }

    #[test]
    fn fresh_memfd_is_zeroed() {
        let region = MappedRegion::map(create_memfd(c"fillbench-zero", 64).unwrap(), 64).unwrap();
        assert!(region.as_slice().iter().all(|&byte| byte == 0));
    }
}

//! `MmapRegion`: an owned memory window.
//!
//! Wraps one `mmap()` of a ring window (or, for tests, of anonymous
//! memory laid out like one). Unmapped on drop. Ring accessors hold it in
//! an `Arc` so every view of a window keeps the mapping alive.

use std::os::fd::{AsRawFd, BorrowedFd};
use std::ptr::NonNull;

use ringbench_core::error::{BenchError, Result};

pub struct MmapRegion {
    base: NonNull<u8>,
    len: usize,
    /// Diagnostic name ("sq_ring", "sqes", "cq_ring").
    window: &'static str,
}

// Safety: the region is plain shared memory. All concurrent access goes
// through the ring accessors, which use atomics for the control words and
// hand out descriptor/completion slots to a single owner at a time.
unsafe impl Send for MmapRegion {}
unsafe impl Sync for MmapRegion {}

impl MmapRegion {
    /// Map `len` bytes of the ring file at `offset` (one of the
    /// `IORING_OFF_*` constants), shared and pre-faulted.
    pub fn map_ring(
        fd: BorrowedFd<'_>,
        len: usize,
        offset: i64,
        window: &'static str,
    ) -> Result<Self> {
        if len == 0 {
            return Err(BenchError::Layout("zero-length ring window"));
        }
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_POPULATE,
                fd.as_raw_fd(),
                offset as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            let errno = std::io::Error::last_os_error()
                .raw_os_error()
                .unwrap_or(libc::EINVAL);
            return Err(BenchError::Mmap { window, errno });
        }
        Self::from_raw(ptr, len, window)
    }

    /// Zero-filled private anonymous memory, page-aligned.
    #[cfg(any(test, feature = "testing"))]
    pub fn anonymous(len: usize, window: &'static str) -> Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len.max(1),
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            let errno = std::io::Error::last_os_error()
                .raw_os_error()
                .unwrap_or(libc::ENOMEM);
            return Err(BenchError::Mmap { window, errno });
        }
        Self::from_raw(ptr, len.max(1), window)
    }

    fn from_raw(ptr: *mut libc::c_void, len: usize, window: &'static str) -> Result<Self> {
        let base = NonNull::new(ptr as *mut u8).ok_or(BenchError::Mmap {
            window,
            errno: libc::EFAULT,
        })?;
        Ok(Self { base, len, window })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn window(&self) -> &'static str {
        self.window
    }

    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Pointer to a `T` at byte `offset`, checked to lie inside the window
    /// and be aligned for `T`. `count` consecutive `T`s must fit.
    pub fn typed_ptr<T>(&self, offset: u32, count: u32) -> Result<*mut T> {
        let offset = offset as usize;
        let bytes = (count as usize)
            .checked_mul(std::mem::size_of::<T>())
            .and_then(|b| b.checked_add(offset))
            .ok_or(BenchError::Layout("offset overflow"))?;
        if bytes > self.len {
            return Err(BenchError::Layout("field outside mapped window"));
        }
        if offset % std::mem::align_of::<T>() != 0 {
            return Err(BenchError::Layout("misaligned ring field"));
        }
        // Safety: offset + count * size_of::<T>() <= len, checked above.
        Ok(unsafe { self.base.as_ptr().add(offset) as *mut T })
    }
}

impl std::fmt::Debug for MmapRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapRegion")
            .field("window", &self.window)
            .field("base", &format_args!("{:#x}", self.base_addr()))
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_anonymous_is_zeroed() {
        let m = MmapRegion::anonymous(4096, "test").unwrap();
        let p = m.typed_ptr::<u32>(0, 1024).unwrap();
        let all_zero = (0..1024).all(|i| unsafe { *p.add(i) } == 0);
        assert!(all_zero);
    }

    #[test]
    fn test_typed_ptr_bounds() {
        let m = MmapRegion::anonymous(4096, "test").unwrap();
        assert!(m.typed_ptr::<AtomicU32>(4092, 1).is_ok());
        assert!(m.typed_ptr::<AtomicU32>(4093, 1).is_err());
        assert!(m.typed_ptr::<AtomicU32>(4096, 1).is_err());
        assert!(m.typed_ptr::<u32>(64, 1008).is_ok());
        assert!(m.typed_ptr::<u32>(64, 1009).is_err());
    }

    #[test]
    fn test_typed_ptr_alignment() {
        let m = MmapRegion::anonymous(4096, "test").unwrap();
        assert!(matches!(
            m.typed_ptr::<u64>(4, 1),
            Err(BenchError::Layout("misaligned ring field"))
        ));
    }
}

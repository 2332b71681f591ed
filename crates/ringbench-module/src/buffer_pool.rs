//! `BufferPool`: one aligned read buffer per ring slot.
//!
//! A single page-aligned allocation carved into `depth` equal buffers,
//! plus a matching array of `iovec`s. Slot `i` always uses buffer `i`,
//! so the pool is an arena indexed by slot number: nothing is handed out
//! or returned, and nothing is allocated after startup. The same iovec
//! array is what `IORING_REGISTER_BUFFERS` takes in fixed-buffer mode.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use ringbench_core::error::{BenchError, Result};

/// Alignment of the arena. Satisfies O_DIRECT on every block size the
/// engine accepts up to a page, and page-aligns larger ones.
const ARENA_ALIGN: usize = 4096;

pub struct BufferPool {
    base: NonNull<u8>,
    layout: Layout,
    block_size: u32,
    iovecs: Box<[libc::iovec]>,
}

// Safety: the arena is exclusively owned; the raw pointers in `iovecs`
// point into it and move with it.
unsafe impl Send for BufferPool {}

impl BufferPool {
    pub fn new(depth: u32, block_size: u32) -> Result<Self> {
        if depth == 0 || block_size == 0 {
            return Err(BenchError::Config("buffer pool needs depth and block size".into()));
        }
        let total = (depth as usize)
            .checked_mul(block_size as usize)
            .ok_or_else(|| BenchError::Config("buffer pool size overflows".into()))?;
        let layout = Layout::from_size_align(total, ARENA_ALIGN.max(block_size as usize))
            .map_err(|e| BenchError::Config(format!("buffer pool layout: {e}")))?;

        let base = NonNull::new(unsafe { alloc_zeroed(layout) })
            .ok_or(BenchError::Io(std::io::Error::from_raw_os_error(libc::ENOMEM)))?;

        let iovecs = (0..depth as usize)
            .map(|i| libc::iovec {
                // Safety: i * block_size < total.
                iov_base: unsafe { base.as_ptr().add(i * block_size as usize) } as *mut libc::c_void,
                iov_len: block_size as usize,
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self { base, layout, block_size, iovecs })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.iovecs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.iovecs.is_empty()
    }

    #[inline]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Address of slot `slot`'s buffer.
    #[inline]
    pub fn buffer_addr(&self, slot: u32) -> u64 {
        self.iovecs[slot as usize].iov_base as u64
    }

    /// Address of slot `slot`'s one-element iovec (for READV).
    #[inline]
    pub fn iovec_addr(&self, slot: u32) -> u64 {
        &self.iovecs[slot as usize] as *const libc::iovec as u64
    }

    /// The whole iovec array, for buffer registration.
    pub fn iovecs(&self) -> &[libc::iovec] {
        &self.iovecs
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("slots", &self.iovecs.len())
            .field("block_size", &self.block_size)
            .finish()
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        unsafe { dealloc(self.base.as_ptr(), self.layout) }
    }
}

//! Typed accessors over the three kernel-shared ring windows.
//!
//! Every field position comes from the offset tables `io_uring_setup()`
//! returned and is validated once against the window length when the
//! accessor is built. After that, callers work with logical positions
//! (free-running `u32` head/tail values); masking and pointer arithmetic
//! stay in here.
//!
//! Ordering contract:
//!
//! | Side      | Operation            | Ordering                        |
//! |-----------|----------------------|---------------------------------|
//! | producer  | read SQ head         | Acquire                         |
//! | producer  | publish SQ tail      | Release store, then SeqCst fence |
//! | consumer  | read CQ tail         | Acquire                         |
//! | consumer  | publish CQ head      | Release                         |
//!
//! The SQ tail and CQ head are only ever written from user space, so the
//! owning thread may read its own copy with `Relaxed`.

use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::Arc;

use ringbench_core::error::{BenchError, Result};

use crate::mmap_region::MmapRegion;
use crate::uring_sys::{
    IoCqringOffsets, IoSqringOffsets, IoUringCqe, IoUringParams, IoUringSqe, IORING_SQ_NEED_WAKEUP,
};

/// Read the `ring_mask` / `ring_entries` pair and check it describes a
/// power-of-two ring of `entries` slots.
fn check_geometry(map: &MmapRegion, mask_off: u32, entries_off: u32, entries: u32) -> Result<u32> {
    let mask = unsafe { (*map.typed_ptr::<AtomicU32>(mask_off, 1)?).load(Ordering::Relaxed) };
    let count = unsafe { (*map.typed_ptr::<AtomicU32>(entries_off, 1)?).load(Ordering::Relaxed) };
    if count != entries || !entries.is_power_of_two() {
        return Err(BenchError::Layout("ring entry count mismatch"));
    }
    if mask != entries - 1 {
        return Err(BenchError::Layout("ring mask is not entries - 1"));
    }
    Ok(mask)
}

// ── Submission ring ──

/// Submission control words plus the index array.
#[derive(Clone)]
pub struct SubmissionRing {
    _map: Arc<MmapRegion>,
    head: *mut AtomicU32,
    tail: *mut AtomicU32,
    flags: *mut AtomicU32,
    array: *mut AtomicU32,
    mask: u32,
    entries: u32,
}

// Safety: the pointers target the shared mapping kept alive by `_map`.
// Each queue moves its accessors to exactly one worker thread.
unsafe impl Send for SubmissionRing {}

impl SubmissionRing {
    pub fn new(map: Arc<MmapRegion>, off: &IoSqringOffsets, entries: u32) -> Result<Self> {
        let mask = check_geometry(&map, off.ring_mask, off.ring_entries, entries)?;
        Ok(Self {
            head: map.typed_ptr(off.head, 1)?,
            tail: map.typed_ptr(off.tail, 1)?,
            flags: map.typed_ptr(off.flags, 1)?,
            array: map.typed_ptr(off.array, entries)?,
            mask,
            entries,
            _map: map,
        })
    }

    #[inline]
    pub fn mask(&self) -> u32 {
        self.mask
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.entries
    }

    /// Kernel consumption point.
    #[inline]
    pub fn head(&self) -> u32 {
        unsafe { (*self.head).load(Ordering::Acquire) }
    }

    /// Our own publish point.
    #[inline]
    pub fn tail(&self) -> u32 {
        unsafe { (*self.tail).load(Ordering::Relaxed) }
    }

    /// Descriptor slots not yet handed to the kernel or not yet consumed.
    #[inline]
    pub fn pending(&self) -> u32 {
        self.tail().wrapping_sub(self.head())
    }

    /// Store `slot` in the index array at logical position `pos`.
    #[inline]
    pub fn set_index(&self, pos: u32, slot: u32) {
        debug_assert!(slot < self.entries);
        unsafe { (*self.array.add((pos & self.mask) as usize)).store(slot, Ordering::Relaxed) }
    }

    #[inline]
    pub fn index_at(&self, pos: u32) -> u32 {
        unsafe { (*self.array.add((pos & self.mask) as usize)).load(Ordering::Relaxed) }
    }

    /// Make every descriptor and index written so far visible, then move
    /// the tail. The trailing fence keeps a later `NEED_WAKEUP` check from
    /// being ordered before the tail store.
    #[inline]
    pub fn publish_tail(&self, tail: u32) {
        unsafe { (*self.tail).store(tail, Ordering::Release) };
        fence(Ordering::SeqCst);
    }

    /// The kernel submission thread went idle and wants an explicit wakeup.
    #[inline]
    pub fn needs_wakeup(&self) -> bool {
        unsafe { (*self.flags).load(Ordering::Acquire) & IORING_SQ_NEED_WAKEUP != 0 }
    }

    /// Kernel side: consume one published index. Returns the slot.
    #[cfg(any(test, feature = "testing"))]
    pub(crate) fn kernel_take(&self) -> Option<u32> {
        let head = unsafe { (*self.head).load(Ordering::Relaxed) };
        let tail = unsafe { (*self.tail).load(Ordering::Acquire) };
        if head == tail {
            return None;
        }
        let slot = self.index_at(head);
        unsafe { (*self.head).store(head.wrapping_add(1), Ordering::Release) };
        Some(slot)
    }

    #[cfg(any(test, feature = "testing"))]
    pub(crate) fn kernel_set_flags(&self, flags: u32) {
        unsafe { (*self.flags).store(flags, Ordering::Release) };
    }
}

// ── Descriptor array ──

/// The submission descriptor array (`IORING_OFF_SQES` window).
#[derive(Clone)]
pub struct DescriptorTable {
    _map: Arc<MmapRegion>,
    base: *mut IoUringSqe,
    mask: u32,
}

unsafe impl Send for DescriptorTable {}

impl DescriptorTable {
    pub fn new(map: Arc<MmapRegion>, entries: u32) -> Result<Self> {
        if !entries.is_power_of_two() {
            return Err(BenchError::Layout("descriptor count is not a power of two"));
        }
        Ok(Self {
            base: map.typed_ptr(0, entries)?,
            mask: entries - 1,
            _map: map,
        })
    }

    /// Overwrite descriptor `slot`. The slot must not be visible to the
    /// kernel (its index not yet published, or already consumed).
    #[inline]
    pub fn write(&self, slot: u32, sqe: &IoUringSqe) {
        unsafe { self.base.add((slot & self.mask) as usize).write_volatile(*sqe) }
    }

    #[inline]
    pub fn read(&self, slot: u32) -> IoUringSqe {
        unsafe { self.base.add((slot & self.mask) as usize).read_volatile() }
    }
}

// ── Completion ring ──

#[derive(Clone)]
pub struct CompletionRing {
    _map: Arc<MmapRegion>,
    head: *mut AtomicU32,
    tail: *mut AtomicU32,
    cqes: *mut IoUringCqe,
    mask: u32,
    entries: u32,
}

unsafe impl Send for CompletionRing {}

impl CompletionRing {
    pub fn new(map: Arc<MmapRegion>, off: &IoCqringOffsets, entries: u32) -> Result<Self> {
        let mask = check_geometry(&map, off.ring_mask, off.ring_entries, entries)?;
        Ok(Self {
            head: map.typed_ptr(off.head, 1)?,
            tail: map.typed_ptr(off.tail, 1)?,
            cqes: map.typed_ptr(off.cqes, entries)?,
            mask,
            entries,
            _map: map,
        })
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.entries
    }

    #[inline]
    pub fn head(&self) -> u32 {
        unsafe { (*self.head).load(Ordering::Relaxed) }
    }

    /// Kernel production point. Entries before it are fully written.
    #[inline]
    pub fn tail(&self) -> u32 {
        unsafe { (*self.tail).load(Ordering::Acquire) }
    }

    #[inline]
    pub fn entry(&self, pos: u32) -> IoUringCqe {
        unsafe { self.cqes.add((pos & self.mask) as usize).read_volatile() }
    }

    /// Hand consumed entries back to the kernel.
    #[inline]
    pub fn publish_head(&self, head: u32) {
        unsafe { (*self.head).store(head, Ordering::Release) }
    }

    /// Kernel side: append a completion. False if the ring is full.
    #[cfg(any(test, feature = "testing"))]
    pub(crate) fn kernel_post(&self, cqe: IoUringCqe) -> bool {
        let head = unsafe { (*self.head).load(Ordering::Acquire) };
        let tail = unsafe { (*self.tail).load(Ordering::Relaxed) };
        if tail.wrapping_sub(head) >= self.entries {
            return false;
        }
        unsafe {
            self.cqes.add((tail & self.mask) as usize).write_volatile(cqe);
            (*self.tail).store(tail.wrapping_add(1), Ordering::Release);
        }
        true
    }
}

/// One queue's three ring views.
#[derive(Clone)]
pub struct RingSet {
    pub sq: SubmissionRing,
    pub sqes: DescriptorTable,
    pub cq: CompletionRing,
}

impl RingSet {
    /// Build and validate the accessors from the negotiated parameters.
    pub fn from_params(
        params: &IoUringParams,
        sq_map: Arc<MmapRegion>,
        sqes_map: Arc<MmapRegion>,
        cq_map: Arc<MmapRegion>,
    ) -> Result<Self> {
        Ok(Self {
            sq: SubmissionRing::new(sq_map, &params.sq_off, params.sq_entries)?,
            sqes: DescriptorTable::new(sqes_map, params.sq_entries)?,
            cq: CompletionRing::new(cq_map, &params.cq_off, params.cq_entries)?,
        })
    }
}

/// Byte lengths of the (sq ring, sqes, cq ring) windows.
pub fn window_lengths(params: &IoUringParams) -> (usize, usize, usize) {
    let sq = params.sq_off.array as usize + params.sq_entries as usize * std::mem::size_of::<u32>();
    let sqes = params.sq_entries as usize * std::mem::size_of::<IoUringSqe>();
    let cq = params.cq_off.cqes as usize
        + params.cq_entries as usize * std::mem::size_of::<IoUringCqe>();
    (sq, sqes, cq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::anonymous_rings;

    #[test]
    fn test_window_lengths() {
        let mut p = IoUringParams::default();
        p.sq_entries = 8;
        p.cq_entries = 16;
        p.sq_off.array = 64;
        p.cq_off.cqes = 64;
        assert_eq!(window_lengths(&p), (96, 512, 320));
    }

    #[test]
    fn test_geometry_checked() {
        let (rings, params) = anonymous_rings(8).unwrap();
        assert_eq!(rings.sq.capacity(), 8);
        assert_eq!(rings.sq.mask(), 7);
        assert_eq!(rings.cq.capacity(), 16);

        // Same window, wrong expected entry count.
        let map = rings.sq._map.clone();
        assert!(SubmissionRing::new(map, &params.sq_off, 16).is_err());
    }

    #[test]
    fn test_offsets_outside_window_rejected() {
        let (rings, params) = anonymous_rings(8).unwrap();
        let mut off = params.sq_off;
        off.array = 1 << 20;
        assert!(matches!(
            SubmissionRing::new(rings.sq._map.clone(), &off, 8),
            Err(BenchError::Layout(_))
        ));
    }

    #[test]
    fn test_index_wraps_with_mask() {
        let (rings, _) = anonymous_rings(4).unwrap();
        rings.sq.set_index(5, 3);
        assert_eq!(rings.sq.index_at(1), 3);
    }

    #[test]
    fn test_publish_then_kernel_take() {
        let (rings, _) = anonymous_rings(4).unwrap();
        rings.sq.set_index(0, 2);
        rings.sq.set_index(1, 0);
        assert_eq!(rings.sq.kernel_take(), None);
        rings.sq.publish_tail(2);
        assert_eq!(rings.sq.pending(), 2);
        assert_eq!(rings.sq.kernel_take(), Some(2));
        assert_eq!(rings.sq.kernel_take(), Some(0));
        assert_eq!(rings.sq.kernel_take(), None);
        assert_eq!(rings.sq.head(), 2);
    }

    #[test]
    fn test_completion_post_and_consume() {
        let (rings, _) = anonymous_rings(2).unwrap();
        for i in 0..4 {
            assert!(rings.cq.kernel_post(IoUringCqe { user_data: i, res: 7, flags: 0 }));
        }
        assert!(!rings.cq.kernel_post(IoUringCqe::default()));
        assert_eq!(rings.cq.tail(), 4);
        assert_eq!(rings.cq.entry(2).user_data, 2);
        rings.cq.publish_head(4);
        assert!(rings.cq.kernel_post(IoUringCqe::default()));
    }

    #[test]
    fn test_need_wakeup_flag() {
        let (rings, _) = anonymous_rings(2).unwrap();
        assert!(!rings.sq.needs_wakeup());
        rings.sq.kernel_set_flags(IORING_SQ_NEED_WAKEUP);
        assert!(rings.sq.needs_wakeup());
    }

    #[test]
    fn test_descriptor_roundtrip_slot() {
        let (rings, _) = anonymous_rings(4).unwrap();
        let sqe = IoUringSqe { opcode: 1, fd: 9, off: 4096, user_data: 3, ..Default::default() };
        rings.sqes.write(3, &sqe);
        assert_eq!(rings.sqes.read(3), sqe);
        assert_eq!(rings.sqes.read(7), sqe);
    }
}

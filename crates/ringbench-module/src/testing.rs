//! Test support: rings in anonymous memory and a scripted kernel.
//!
//! `anonymous_rings` lays out the three windows the way a kernel would
//! and returns parameters describing them, so the real accessors,
//! producer and consumer run unchanged. `FakeKernel` plays the kernel's
//! half: it consumes published indices, checks the descriptors behind
//! them, and posts completions according to a script.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use ringbench_core::error::Result;
use ringbench_core::kernel::{EnterOutcome, RingKernel};

use crate::mmap_region::MmapRegion;
use crate::ring::{window_lengths, RingSet};
use crate::uring_sys::{
    IoUringCqe, IoUringParams, IoUringSqe, CQE_F_CACHE_HIT, IORING_OP_READV, IORING_OP_READ_FIXED,
};

/// Build a ring set of `depth` submission slots (and twice as many
/// completion slots) in anonymous memory.
pub fn anonymous_rings(depth: u32) -> Result<(RingSet, IoUringParams)> {
    let mut params = IoUringParams {
        sq_entries: depth,
        cq_entries: depth * 2,
        ..Default::default()
    };
    params.sq_off.head = 0;
    params.sq_off.tail = 4;
    params.sq_off.ring_mask = 8;
    params.sq_off.ring_entries = 12;
    params.sq_off.flags = 16;
    params.sq_off.dropped = 20;
    params.sq_off.array = 64;
    params.cq_off.head = 0;
    params.cq_off.tail = 4;
    params.cq_off.ring_mask = 8;
    params.cq_off.ring_entries = 12;
    params.cq_off.overflow = 16;
    params.cq_off.cqes = 64;

    let (sq_len, sqes_len, cq_len) = window_lengths(&params);
    let sq_map = MmapRegion::anonymous(sq_len, "sq_ring")?;
    let sqes_map = MmapRegion::anonymous(sqes_len, "sqes")?;
    let cq_map = MmapRegion::anonymous(cq_len, "cq_ring")?;

    let seed = |map: &MmapRegion, off: u32, value: u32| -> Result<()> {
        let word = map.typed_ptr::<AtomicU32>(off, 1)?;
        unsafe { (*word).store(value, Ordering::Relaxed) };
        Ok(())
    };
    seed(&sq_map, params.sq_off.ring_mask, depth - 1)?;
    seed(&sq_map, params.sq_off.ring_entries, depth)?;
    seed(&cq_map, params.cq_off.ring_mask, depth * 2 - 1)?;
    seed(&cq_map, params.cq_off.ring_entries, depth * 2)?;

    let rings = RingSet::from_params(
        &params,
        Arc::new(sq_map),
        Arc::new(sqes_map),
        Arc::new(cq_map),
    )?;
    Ok((rings, params))
}

/// A read descriptor with every field the kernel needs filled in.
pub fn descriptor_is_complete(sqe: &IoUringSqe) -> bool {
    if sqe.fd < 0 || sqe.addr == 0 || sqe.len == 0 {
        return false;
    }
    match sqe.opcode {
        IORING_OP_READV => sqe.len == 1,
        IORING_OP_READ_FIXED => true,
        _ => false,
    }
}

/// One scripted response to `enter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeEnter {
    /// Accept at most this many of the requested descriptors.
    Accept(u32),
    /// EAGAIN.
    WouldBlock,
    /// Any other errno.
    Fail(i32),
}

/// Arguments of one recorded `enter` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnterCall {
    pub to_submit: u32,
    pub min_complete: u32,
    pub flags: u32,
}

/// Scripted stand-in for `io_uring_enter()` over anonymous rings.
///
/// With an empty script every call accepts everything requested and
/// completes it immediately with `result` bytes.
pub struct FakeKernel {
    rings: RingSet,
    script: VecDeque<FakeEnter>,
    hold: bool,
    result: i32,
    cache_hit: bool,
    pending: VecDeque<IoUringCqe>,
    calls: Vec<EnterCall>,
    malformed: u32,
    consumed: u64,
    completed: u64,
}

impl FakeKernel {
    pub fn new(rings: RingSet, result: i32) -> Self {
        Self {
            rings,
            script: VecDeque::new(),
            hold: false,
            result,
            cache_hit: false,
            pending: VecDeque::new(),
            calls: Vec::new(),
            malformed: 0,
            consumed: 0,
            completed: 0,
        }
    }

    /// Queue responses for the next calls.
    pub fn script<I: IntoIterator<Item = FakeEnter>>(&mut self, outcomes: I) {
        self.script.extend(outcomes);
    }

    /// While held, consumed descriptors complete nowhere until released.
    pub fn hold_completions(&mut self, hold: bool) {
        self.hold = hold;
    }

    /// Post every held completion that fits in the completion ring.
    pub fn release(&mut self) {
        while let Some(cqe) = self.pending.front().copied() {
            if !self.rings.cq.kernel_post(cqe) {
                break;
            }
            self.pending.pop_front();
            self.completed += 1;
        }
    }

    /// Result reported by completions generated from now on.
    pub fn set_result(&mut self, result: i32) {
        self.result = result;
    }

    pub fn set_cache_hit(&mut self, hit: bool) {
        self.cache_hit = hit;
    }

    pub fn calls(&self) -> &[EnterCall] {
        &self.calls
    }

    /// Published indices whose descriptor was missing a required field.
    pub fn malformed(&self) -> u32 {
        self.malformed
    }

    /// Descriptors taken off the submission ring so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Completions posted so far.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn held(&self) -> usize {
        self.pending.len()
    }

    pub fn rings(&self) -> &RingSet {
        &self.rings
    }

    fn consume(&mut self, n: u32) -> u32 {
        let mut taken = 0;
        while taken < n {
            let Some(slot) = self.rings.sq.kernel_take() else {
                break;
            };
            let sqe = self.rings.sqes.read(slot);
            if !descriptor_is_complete(&sqe) {
                self.malformed += 1;
            }
            self.pending.push_back(IoUringCqe {
                user_data: sqe.user_data,
                res: self.result,
                flags: if self.cache_hit { CQE_F_CACHE_HIT } else { 0 },
            });
            taken += 1;
        }
        self.consumed += taken as u64;
        taken
    }
}

impl RingKernel for FakeKernel {
    fn enter(&mut self, to_submit: u32, min_complete: u32, flags: u32) -> EnterOutcome {
        self.calls.push(EnterCall { to_submit, min_complete, flags });
        let outcome = match self.script.pop_front().unwrap_or(FakeEnter::Accept(u32::MAX)) {
            FakeEnter::Accept(cap) => EnterOutcome::Accepted(self.consume(to_submit.min(cap))),
            FakeEnter::WouldBlock => EnterOutcome::WouldBlock,
            FakeEnter::Fail(errno) => return EnterOutcome::Failed(errno),
        };
        if !self.hold {
            self.release();
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_rings_layout() {
        let (rings, params) = anonymous_rings(16).unwrap();
        assert_eq!(params.sq_entries, 16);
        assert_eq!(params.cq_entries, 32);
        assert_eq!(rings.sq.head(), 0);
        assert_eq!(rings.sq.tail(), 0);
        assert_eq!(rings.cq.capacity(), 32);
    }

    #[test]
    fn test_descriptor_is_complete() {
        let mut sqe = IoUringSqe {
            opcode: IORING_OP_READ_FIXED,
            fd: 3,
            addr: 0x1000,
            len: 4096,
            ..Default::default()
        };
        assert!(descriptor_is_complete(&sqe));
        sqe.opcode = IORING_OP_READV;
        assert!(!descriptor_is_complete(&sqe));
        sqe.len = 1;
        assert!(descriptor_is_complete(&sqe));
        sqe.addr = 0;
        assert!(!descriptor_is_complete(&sqe));
    }

    #[test]
    fn test_scripted_outcomes() {
        let (rings, _) = anonymous_rings(4).unwrap();
        let mut k = FakeKernel::new(rings, 512);
        k.script([FakeEnter::WouldBlock, FakeEnter::Fail(5)]);
        assert_eq!(k.enter(0, 0, 0), EnterOutcome::WouldBlock);
        assert_eq!(k.enter(0, 0, 0), EnterOutcome::Failed(5));
        assert_eq!(k.enter(0, 0, 0), EnterOutcome::Accepted(0));
        assert_eq!(k.calls().len(), 3);
    }
}

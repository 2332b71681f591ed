//! `SubmissionProducer`: fills free submission slots with random reads.
//!
//! Slot `s` always pairs descriptor `s` with buffer `s`, and the slot is
//! `tail & mask` at the moment it is produced. A slot can only be reused
//! after the kernel has moved the head past it, so a descriptor the kernel
//! might still read is never overwritten.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ringbench_core::error::{BenchError, Result};

use crate::buffer_pool::BufferPool;
use crate::ring::{DescriptorTable, SubmissionRing};
use crate::target::TargetSet;
use crate::uring_sys::{IoUringSqe, IORING_OP_READV, IORING_OP_READ_FIXED};

pub struct SubmissionProducer {
    sq: SubmissionRing,
    sqes: DescriptorTable,
    targets: Arc<TargetSet>,
    buffers: BufferPool,
    rng: StdRng,
    /// Round-robin target cursor.
    next_target: usize,
    fixed: bool,
    block_size: u32,
}

impl SubmissionProducer {
    pub fn new(
        sq: SubmissionRing,
        sqes: DescriptorTable,
        targets: Arc<TargetSet>,
        buffers: BufferPool,
        fixed: bool,
        seed: u64,
    ) -> Result<Self> {
        if buffers.len() != sq.capacity() as usize {
            return Err(BenchError::Config(format!(
                "buffer pool has {} slots for a ring of {}",
                buffers.len(),
                sq.capacity()
            )));
        }
        if targets.is_empty() {
            return Err(BenchError::NoTargets);
        }
        Ok(Self {
            block_size: buffers.block_size(),
            sq,
            sqes,
            targets,
            buffers,
            rng: StdRng::seed_from_u64(seed),
            next_target: 0,
            fixed,
        })
    }

    /// Produce up to `max` descriptors into free slots and publish them.
    /// Returns how many were produced.
    pub fn prep(&mut self, max: u32) -> u32 {
        let head = self.sq.head();
        let start = self.sq.tail();
        let capacity = self.sq.capacity();
        let mut tail = start;
        let mut produced = 0;

        while produced < max && tail.wrapping_sub(head) < capacity {
            let slot = tail & self.sq.mask();
            let sqe = self.build(slot);
            self.sqes.write(slot, &sqe);
            self.sq.set_index(tail, slot);
            tail = tail.wrapping_add(1);
            produced += 1;
        }

        if tail != start {
            self.sq.publish_tail(tail);
        }
        produced
    }

    fn build(&mut self, slot: u32) -> IoUringSqe {
        let target = self.targets.get(self.next_target);
        self.next_target = (self.next_target + 1) % self.targets.len();
        let block = self.rng.random_range(0..target.usable_blocks());

        let mut sqe = IoUringSqe {
            fd: target.fd(),
            off: block * self.block_size as u64,
            user_data: slot as u64,
            ..Default::default()
        };
        if self.fixed {
            sqe.opcode = IORING_OP_READ_FIXED;
            sqe.addr = self.buffers.buffer_addr(slot);
            sqe.len = self.block_size;
            sqe.buf_index = slot as u16;
        } else {
            sqe.opcode = IORING_OP_READV;
            sqe.addr = self.buffers.iovec_addr(slot);
            sqe.len = 1;
        }
        sqe
    }

    /// The pool the descriptors point into.
    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::RingSet;
    use crate::target::Target;
    use crate::testing::{anonymous_rings, descriptor_is_complete};
    use tempfile::NamedTempFile;

    struct Fixture {
        rings: RingSet,
        producer: SubmissionProducer,
        _files: Vec<NamedTempFile>,
    }

    fn fixture(depth: u32, blocks: &[u64], fixed: bool) -> Fixture {
        let (rings, _) = anonymous_rings(depth).unwrap();
        let mut files = Vec::new();
        let mut targets = Vec::new();
        for &b in blocks {
            let f = NamedTempFile::new().unwrap();
            f.as_file().set_len(b * 4096).unwrap();
            targets.push(Target::open(f.path(), 4096, true).unwrap());
            files.push(f);
        }
        let set = Arc::new(TargetSet::from_targets(targets).unwrap());
        let pool = BufferPool::new(depth, 4096).unwrap();
        let producer = SubmissionProducer::new(
            rings.sq.clone(),
            rings.sqes.clone(),
            set,
            pool,
            fixed,
            7,
        )
        .unwrap();
        Fixture { rings, producer, _files: files }
    }

    #[test]
    fn test_prep_publishes_batch() {
        let mut fx = fixture(8, &[64], false);
        assert_eq!(fx.producer.prep(5), 5);
        assert_eq!(fx.rings.sq.tail(), 5);
        for pos in 0..5 {
            let slot = fx.rings.sq.index_at(pos);
            assert_eq!(slot, pos);
            let sqe = fx.rings.sqes.read(slot);
            assert!(descriptor_is_complete(&sqe));
            assert_eq!(sqe.opcode, IORING_OP_READV);
            assert_eq!(sqe.user_data, slot as u64);
        }
    }

    #[test]
    fn test_prep_bounded_by_free_capacity() {
        let mut fx = fixture(8, &[64], false);
        assert_eq!(fx.producer.prep(32), 8);
        assert_eq!(fx.producer.prep(1), 0);
        assert_eq!(fx.rings.sq.tail(), 8);

        fx.rings.sq.kernel_take().unwrap();
        fx.rings.sq.kernel_take().unwrap();
        assert_eq!(fx.producer.prep(8), 2);
        // Wrapped around onto the consumed slots.
        assert_eq!(fx.rings.sq.index_at(8), 0);
        assert_eq!(fx.rings.sq.index_at(9), 1);
    }

    #[test]
    fn test_zero_max_publishes_nothing() {
        let mut fx = fixture(4, &[64], false);
        assert_eq!(fx.producer.prep(0), 0);
        assert_eq!(fx.rings.sq.tail(), 0);
    }

    #[test]
    fn test_offsets_aligned_and_in_bounds() {
        let mut fx = fixture(64, &[5], false);
        fx.producer.prep(64);
        for slot in 0..64 {
            let sqe = fx.rings.sqes.read(slot);
            assert_eq!(sqe.off % 4096, 0);
            // 5 blocks, last excluded.
            assert!(sqe.off / 4096 < 4);
        }
    }

    #[test]
    fn test_round_robin_targets() {
        let mut fx = fixture(8, &[16, 16], false);
        fx.producer.prep(4);
        let fds: Vec<i32> = (0..4).map(|s| fx.rings.sqes.read(s).fd).collect();
        assert_ne!(fds[0], fds[1]);
        assert_eq!(fds[0], fds[2]);
        assert_eq!(fds[1], fds[3]);
    }

    #[test]
    fn test_fixed_buffer_descriptor() {
        let mut fx = fixture(4, &[16], true);
        fx.producer.prep(4);
        for slot in 0..4 {
            let sqe = fx.rings.sqes.read(slot);
            assert_eq!(sqe.opcode, IORING_OP_READ_FIXED);
            assert_eq!(sqe.buf_index, slot as u16);
            assert_eq!(sqe.len, 4096);
            assert_eq!(sqe.addr, fx.producer.buffers().buffer_addr(slot));
            assert!(descriptor_is_complete(&sqe));
        }
    }

    #[test]
    fn test_pool_must_match_ring() {
        let (rings, _) = anonymous_rings(8).unwrap();
        let f = NamedTempFile::new().unwrap();
        f.as_file().set_len(8 * 4096).unwrap();
        let set = Arc::new(TargetSet::from_targets(vec![Target::open(f.path(), 4096, true).unwrap()]).unwrap());
        let pool = BufferPool::new(4, 4096).unwrap();
        assert!(SubmissionProducer::new(rings.sq, rings.sqes, set, pool, false, 1).is_err());
    }
}

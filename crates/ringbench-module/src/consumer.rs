//! `CompletionConsumer`: drains the completion ring.

use ringbench_core::error::{BenchError, Result};
use ringbench_core::inflight::Inflight;
use ringbench_core::stats::QueueStats;

use crate::ring::CompletionRing;
use crate::uring_sys::CQE_F_CACHE_HIT;

pub struct CompletionConsumer {
    cq: CompletionRing,
    /// Every read transfers exactly one block.
    expected: i32,
}

impl CompletionConsumer {
    pub fn new(cq: CompletionRing, block_size: u32) -> Self {
        Self { cq, expected: block_size as i32 }
    }

    /// Drain every visible completion, classify it, and hand the slots back.
    ///
    /// A completion whose result is not exactly one block stops the drain.
    /// Entries before it are still accounted and released; the offending
    /// entry and everything after it stay in the ring.
    pub fn reap(&mut self, inflight: &mut Inflight, stats: &QueueStats) -> Result<u32> {
        let mut head = self.cq.head();
        let tail = self.cq.tail();
        let mut hits = 0u32;
        let mut misses = 0u32;
        let mut bad = None;

        while head != tail {
            let cqe = self.cq.entry(head);
            if cqe.res != self.expected {
                bad = Some(cqe.res);
                break;
            }
            if cqe.flags & CQE_F_CACHE_HIT != 0 {
                hits += 1;
            } else {
                misses += 1;
            }
            head = head.wrapping_add(1);
        }

        let reaped = hits + misses;
        if reaped > 0 {
            self.cq.publish_head(head);
            inflight.sub(reaped);
            stats.add_reaped(hits, misses);
        }

        match bad {
            Some(result) => Err(BenchError::UnexpectedResult { result, expected: self.expected }),
            None => Ok(reaped),
        }
    }
}

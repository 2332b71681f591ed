//! Per-queue statistics and the telemetry math.
//!
//! Each queue owns one `QueueStats`. The submitter thread is the only
//! writer; the reporter thread reads the counters without locking. All
//! accesses are `Relaxed`: a torn view across counters only skews one
//! telemetry line and never affects I/O correctness.

use std::fmt;
use std::ops::Add;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic counters for one queue, plus the inflight gauge.
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Descriptors the kernel accepted.
    done: AtomicU64,
    /// io_uring_enter() calls.
    calls: AtomicU64,
    /// Completion entries reaped.
    reaps: AtomicU64,
    cache_hit: AtomicU64,
    cache_miss: AtomicU64,
    /// Submitted-but-not-completed, mirrored from the worker's counter.
    inflight: AtomicU32,
}

impl QueueStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add_done(&self, n: u32) {
        self.done.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_calls(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one drain: `hits + misses` entries reaped.
    #[inline]
    pub fn add_reaped(&self, hits: u32, misses: u32) {
        if hits > 0 {
            self.cache_hit.fetch_add(hits as u64, Ordering::Relaxed);
        }
        if misses > 0 {
            self.cache_miss.fetch_add(misses as u64, Ordering::Relaxed);
        }
        self.reaps
            .fetch_add(hits as u64 + misses as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_inflight(&self, n: u32) {
        self.inflight.store(n, Ordering::Relaxed);
    }

    /// Read every counter once.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            done: self.done.load(Ordering::Relaxed),
            calls: self.calls.load(Ordering::Relaxed),
            reaps: self.reaps.load(Ordering::Relaxed),
            cache_hit: self.cache_hit.load(Ordering::Relaxed),
            cache_miss: self.cache_miss.load(Ordering::Relaxed),
            inflight: self.inflight.load(Ordering::Relaxed) as u64,
        }
    }
}

/// Raw counter values at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub done: u64,
    pub calls: u64,
    pub reaps: u64,
    pub cache_hit: u64,
    pub cache_miss: u64,
    /// Gauge, not a counter: carried through `delta()` unchanged.
    pub inflight: u64,
}

impl StatsSnapshot {
    /// Counter increase since `prev`. The inflight gauge is taken from `self`.
    pub fn delta(&self, prev: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            done: self.done.wrapping_sub(prev.done),
            calls: self.calls.wrapping_sub(prev.calls),
            reaps: self.reaps.wrapping_sub(prev.reaps),
            cache_hit: self.cache_hit.wrapping_sub(prev.cache_hit),
            cache_miss: self.cache_miss.wrapping_sub(prev.cache_miss),
            inflight: self.inflight,
        }
    }
}

impl Add for StatsSnapshot {
    type Output = StatsSnapshot;

    fn add(self, rhs: StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            done: self.done + rhs.done,
            calls: self.calls + rhs.calls,
            reaps: self.reaps + rhs.reaps,
            cache_hit: self.cache_hit + rhs.cache_hit,
            cache_miss: self.cache_miss + rhs.cache_miss,
            inflight: self.inflight + rhs.inflight,
        }
    }
}

/// Derived metrics for one sampling interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub ops_per_sec: u64,
    /// Accepted descriptors per enter call.
    pub done_per_call: u64,
    /// Reaped completions per enter call.
    pub reaps_per_call: u64,
    pub inflight: u64,
    /// 0.0 ..= 100.0
    pub cache_hit_pct: f64,
}

impl Telemetry {
    /// Compute metrics from a counter delta over `interval`.
    ///
    /// Per-call ratios are 0 when no calls were made; the hit percentage
    /// is 0 when nothing was classified.
    pub fn from_delta(delta: &StatsSnapshot, interval: Duration) -> Self {
        let secs = interval.as_secs_f64();
        let ops_per_sec = if secs > 0.0 {
            (delta.done as f64 / secs).round() as u64
        } else {
            0
        };
        let (done_per_call, reaps_per_call) = if delta.calls > 0 {
            (delta.done / delta.calls, delta.reaps / delta.calls)
        } else {
            (0, 0)
        };
        let classified = delta.cache_hit + delta.cache_miss;
        let cache_hit_pct = if classified > 0 {
            delta.cache_hit as f64 / classified as f64 * 100.0
        } else {
            0.0
        };
        Self {
            ops_per_sec,
            done_per_call,
            reaps_per_call,
            inflight: delta.inflight,
            cache_hit_pct,
        }
    }
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IOPS={}, IOS/call={}/{}, inflight={}, Cachehit={:.2}%",
            self.ops_per_sec,
            self.done_per_call,
            self.reaps_per_call,
            self.inflight,
            self.cache_hit_pct
        )
    }
}

/// One-interval rolling window: keeps only the previous raw snapshot.
#[derive(Debug, Default)]
pub struct RollingSample {
    prev: StatsSnapshot,
}

impl RollingSample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute telemetry against the previous sample and retain `current`.
    pub fn advance(&mut self, current: StatsSnapshot, interval: Duration) -> Telemetry {
        let delta = current.delta(&self.prev);
        self.prev = current;
        Telemetry::from_delta(&delta, interval)
    }

    pub fn previous(&self) -> &StatsSnapshot {
        &self.prev
    }
}

//! `StatsReporter`: one telemetry line per interval.
//!
//! Runs on the thread that started the engine. Sums every queue's counters,
//! diffs against the previous sample and prints the derived rates. Worker
//! failures posted since the last tick are logged here, outside the
//! worker's hot loop.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use ringbench_core::error::{BenchError, Result};
use ringbench_core::shutdown::ShutdownFlags;
use ringbench_core::stats::{QueueStats, RollingSample, StatsSnapshot, Telemetry};

pub struct StatsReporter<W: Write> {
    out: W,
    queues: Vec<Arc<QueueStats>>,
    interval: Duration,
    shutdown: &'static ShutdownFlags,
    failures: Arc<ArrayQueue<BenchError>>,
    collected: Vec<BenchError>,
    sample: RollingSample,
}

impl<W: Write> StatsReporter<W> {
    pub fn new(
        out: W,
        queues: Vec<Arc<QueueStats>>,
        interval: Duration,
        shutdown: &'static ShutdownFlags,
        failures: Arc<ArrayQueue<BenchError>>,
    ) -> Self {
        Self {
            out,
            queues,
            interval,
            shutdown,
            failures,
            collected: Vec::new(),
            sample: RollingSample::new(),
        }
    }

    /// Sleep, sample, print; until the finish flag is raised.
    pub fn run(&mut self) -> Result<()> {
        loop {
            std::thread::sleep(self.interval);
            self.tick()?;
            if self.shutdown.is_finished() {
                return Ok(());
            }
        }
    }

    /// Take one sample and emit its line.
    pub fn tick(&mut self) -> Result<Telemetry> {
        let total = self
            .queues
            .iter()
            .map(|q| q.snapshot())
            .fold(StatsSnapshot::default(), |acc, s| acc + s);
        let telemetry = self.sample.advance(total, self.interval);
        writeln!(self.out, "{telemetry}")?;
        self.out.flush()?;
        self.collect_failures();
        Ok(telemetry)
    }

    fn collect_failures(&mut self) {
        while let Some(err) = self.failures.pop() {
            tracing::error!(error = %err, "submitter failed");
            self.collected.push(err);
        }
    }

    /// Cumulative totals as of the last tick.
    pub fn totals(&self) -> &StatsSnapshot {
        self.sample.previous()
    }

    /// Failures collected so far, oldest first. Drains anything still queued.
    pub fn take_failures(&mut self) -> Vec<BenchError> {
        self.collect_failures();
        std::mem::take(&mut self.collected)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaked_flags() -> &'static ShutdownFlags {
        Box::leak(Box::new(ShutdownFlags::new()))
    }

    fn reporter(queues: Vec<Arc<QueueStats>>, flags: &'static ShutdownFlags) -> StatsReporter<Vec<u8>> {
        StatsReporter::new(
            Vec::new(),
            queues,
            Duration::from_secs(1),
            flags,
            Arc::new(ArrayQueue::new(4)),
        )
    }

    #[test]
    fn test_tick_emits_line() {
        let q = Arc::new(QueueStats::new());
        let mut r = reporter(vec![q.clone()], leaked_flags());
        for _ in 0..10 {
            q.inc_calls();
            q.add_done(8);
        }
        q.add_reaped(7, 3);
        q.set_inflight(32);

        let t = r.tick().unwrap();
        assert_eq!(t.ops_per_sec, 80);
        assert_eq!(t.done_per_call, 8);
        assert_eq!(t.reaps_per_call, 1);
        let out = String::from_utf8(r.into_inner()).unwrap();
        assert_eq!(out, "IOPS=80, IOS/call=8/1, inflight=32, Cachehit=70.00%\n");
    }

    #[test]
    fn test_second_tick_is_a_delta() {
        let q = Arc::new(QueueStats::new());
        let mut r = reporter(vec![q.clone()], leaked_flags());
        q.add_done(100);
        q.inc_calls();
        r.tick().unwrap();
        let t = r.tick().unwrap();
        assert_eq!(t.ops_per_sec, 0);
        assert_eq!(t.done_per_call, 0);
        assert_eq!(t.cache_hit_pct, 0.0);
        assert_eq!(r.totals().done, 100);
    }

    #[test]
    fn test_queues_are_summed() {
        let a = Arc::new(QueueStats::new());
        let b = Arc::new(QueueStats::new());
        let mut r = reporter(vec![a.clone(), b.clone()], leaked_flags());
        a.add_done(30);
        b.add_done(50);
        a.inc_calls();
        b.inc_calls();
        a.set_inflight(4);
        b.set_inflight(6);
        let t = r.tick().unwrap();
        assert_eq!(t.ops_per_sec, 80);
        assert_eq!(t.done_per_call, 40);
        assert_eq!(t.inflight, 10);
    }

    #[test]
    fn test_failures_collected() {
        let failures = Arc::new(ArrayQueue::new(2));
        let mut r = StatsReporter::new(
            Vec::new(),
            vec![],
            Duration::from_secs(1),
            leaked_flags(),
            failures.clone(),
        );
        failures.push(BenchError::Enter(5)).unwrap();
        r.tick().unwrap();
        failures.push(BenchError::UnexpectedResult { result: 0, expected: 4096 }).unwrap();
        let all = r.take_failures();
        assert_eq!(all.len(), 2);
        assert!(matches!(all[0], BenchError::Enter(5)));
    }

    #[test]
    fn test_run_stops_when_finished() {
        let flags = leaked_flags();
        flags.mark_finished();
        let q = Arc::new(QueueStats::new());
        let mut r = StatsReporter::new(
            Vec::new(),
            vec![q],
            Duration::from_millis(1),
            flags,
            Arc::new(ArrayQueue::new(1)),
        );
        r.run().unwrap();
        let out = String::from_utf8(r.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 1);
    }
}

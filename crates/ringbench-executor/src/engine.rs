//! `Engine`: wires queues to worker threads and runs the reporter.
//!
//! Startup order: validate the config, open and size every target, lift
//! the memlock limit, probe the read opcode, then build every ring (and
//! register its buffers) before the first thread starts. Any failure up to
//! that point returns before a single read is issued.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_queue::ArrayQueue;
use ringbench_core::config::EngineConfig;
use ringbench_core::error::{BenchError, Result};
use ringbench_core::shutdown::ShutdownFlags;
use ringbench_core::stats::{QueueStats, StatsSnapshot};
use ringbench_module::setup::raise_memlock_limit;
use ringbench_module::{probe, BufferPool, CompletionConsumer, SubmissionProducer, TargetSet, UringHandle};

use crate::reporter::StatsReporter;
use crate::shutdown;
use crate::submitter::SubmitterLoop;

pub struct Engine {
    config: EngineConfig,
    targets: Arc<TargetSet>,
    shutdown: &'static ShutdownFlags,
}

/// A ring that is fully set up but whose worker has not started.
struct Queue {
    handle: UringHandle,
    pool: BufferPool,
}

impl Engine {
    /// Validate `config` and open `paths`. Nothing touches io_uring yet.
    pub fn new<P: AsRef<Path>>(config: EngineConfig, paths: &[P]) -> Result<Self> {
        config.validate()?;
        let targets = TargetSet::open(paths, config.block_size, config.buffered)?;
        Ok(Self {
            config,
            targets: Arc::new(targets),
            shutdown: shutdown::flags(),
        })
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    /// Run until interrupted or a worker fails. Returns the cumulative
    /// totals over all queues.
    pub fn run(self) -> Result<StatsSnapshot> {
        raise_memlock_limit()?;
        probe::check_read_opcode(self.config.fixed_buffers)?;

        let queues = (0..self.config.queues)
            .map(|_| self.build_queue())
            .collect::<Result<Vec<_>>>()?;

        let failures = Arc::new(ArrayQueue::new(self.config.queues));
        let stats: Vec<Arc<QueueStats>> =
            (0..self.config.queues).map(|_| Arc::new(QueueStats::new())).collect();

        let mut workers = Vec::with_capacity(queues.len());
        for (i, queue) in queues.into_iter().enumerate() {
            match self.spawn_worker(i, queue, stats[i].clone(), failures.clone()) {
                Ok(h) => workers.push(h),
                Err(e) => {
                    self.shutdown.request_stop();
                    join_workers(workers);
                    return Err(e);
                }
            }
        }

        let mut reporter = StatsReporter::new(
            io::stdout(),
            stats.clone(),
            self.config.report_interval,
            self.shutdown,
            failures,
        );
        let reported = reporter.run();

        // One queue finishing (or failing) ends the run for all of them.
        self.shutdown.request_stop();
        let panics = join_workers(workers);
        reported?;

        let mut failed = reporter.take_failures();
        failed.extend(panics);
        if let Some(first) = failed.into_iter().next() {
            return Err(first);
        }

        let totals = stats
            .iter()
            .map(|s| s.snapshot())
            .fold(StatsSnapshot::default(), |acc, s| acc + s);
        tracing::info!(
            done = totals.done,
            calls = totals.calls,
            reaps = totals.reaps,
            "run complete"
        );
        Ok(totals)
    }

    fn build_queue(&self) -> Result<Queue> {
        let handle = UringHandle::new(&self.config)?;
        let pool = BufferPool::new(self.config.depth, self.config.block_size)?;
        if self.config.fixed_buffers {
            handle.register_buffers(&pool)?;
        }
        Ok(Queue { handle, pool })
    }

    fn spawn_worker(
        &self,
        index: usize,
        queue: Queue,
        stats: Arc<QueueStats>,
        failures: Arc<ArrayQueue<BenchError>>,
    ) -> Result<JoinHandle<()>> {
        let rings = queue.handle.rings().clone();
        let producer = SubmissionProducer::new(
            rings.sq,
            rings.sqes,
            self.targets.clone(),
            queue.pool,
            self.config.fixed_buffers,
            rand::random(),
        )?;
        let consumer = CompletionConsumer::new(rings.cq, self.config.block_size);
        let mut submitter = SubmitterLoop::new(
            queue.handle,
            producer,
            consumer,
            stats,
            self.shutdown,
            &self.config,
        );

        let handle = thread::Builder::new()
            .name(format!("ringbench-q{index}"))
            .spawn(move || {
                if let Err(e) = shutdown::block_interrupt() {
                    tracing::warn!(queue = index, error = %e, "SIGINT left unmasked on submitter");
                }
                tracing::info!(queue = index, tid = nix::unistd::gettid().as_raw(), "submitter running");
                if let Err(e) = submitter.run() {
                    // Sized to the queue count, so there is always room.
                    let _ = failures.push(e);
                }
            })?;
        Ok(handle)
    }
}

/// Join every worker; a panic becomes a `WorkerPanic` error.
fn join_workers(workers: Vec<JoinHandle<()>>) -> Vec<BenchError> {
    workers
        .into_iter()
        .enumerate()
        .filter_map(|(queue, h)| {
            h.join().err().map(|payload| {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panicked".to_string());
                BenchError::WorkerPanic { queue, reason }
            })
        })
        .collect()
}

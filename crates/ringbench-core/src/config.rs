//! Engine configuration
//!
//! Library defaults with runtime environment overrides, then builder-style
//! overrides from the command line.
//!
//! # Configuration priority (highest wins)
//!
//! 1. Builder calls (command-line flags)
//! 2. Environment variables
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use ringbench_core::config::EngineConfig;
//!
//! let config = EngineConfig::from_env()
//!     .depth(64)
//!     .fixed_buffers(true);
//! config.validate()?;
//! ```

use std::time::Duration;

use crate::env::EnvSource;
use crate::error::{BenchError, Result};

/// Default ring depth (outstanding descriptors per queue).
pub const DEFAULT_DEPTH: u32 = 32;
/// Default maximum descriptors produced per PREP.
pub const DEFAULT_BATCH_SUBMIT: u32 = 8;
/// Default upper bound on the minimum-completions wait threshold.
pub const DEFAULT_BATCH_COMPLETE: u32 = 8;
/// Default transfer size.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;
/// Largest ring the engine will ask for.
pub const MAX_DEPTH: u32 = 4096;
/// At most this many targets per run.
pub const MAX_TARGETS: usize = 16;
/// At most this many submitter threads.
pub const MAX_QUEUES: usize = 64;

/// Configuration for the ring engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Ring depth. Power of two.
    pub depth: u32,
    /// Max descriptors produced per PREP.
    pub batch_submit: u32,
    /// Max completions to block for once the pipeline nears saturation.
    pub batch_complete: u32,
    /// Bytes per read. Power of two, at least 512.
    pub block_size: u32,
    /// Device-side completion polling (IORING_SETUP_IOPOLL).
    pub polled: bool,
    /// Register the buffer pool once and reference buffers by index.
    pub fixed_buffers: bool,
    /// Go through the page cache (no O_DIRECT).
    pub buffered: bool,
    /// Kernel-side submission polling thread (IORING_SETUP_SQPOLL).
    pub sq_thread_poll: bool,
    /// Pin the submission polling thread to this CPU.
    pub sq_thread_cpu: Option<u32>,
    /// Idle time before the submission polling thread sleeps.
    pub sq_thread_idle: Duration,
    /// Independent rings, one submitter thread each.
    pub queues: usize,
    /// Telemetry sampling interval.
    pub report_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            batch_submit: DEFAULT_BATCH_SUBMIT,
            batch_complete: DEFAULT_BATCH_COMPLETE,
            block_size: DEFAULT_BLOCK_SIZE,
            polled: true,
            fixed_buffers: false,
            buffered: false,
            sq_thread_poll: false,
            sq_thread_cpu: None,
            sq_thread_idle: Duration::from_millis(1000),
            queues: 1,
            report_interval: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    /// Library defaults with environment overrides applied.
    ///
    /// Environment variables (all optional):
    /// - `RINGBENCH_DEPTH` - Ring depth
    /// - `RINGBENCH_BATCH_SUBMIT` - Descriptors per PREP
    /// - `RINGBENCH_BATCH_COMPLETE` - Wait threshold cap
    /// - `RINGBENCH_BLOCK_SIZE` - Bytes per read
    /// - `RINGBENCH_POLLED` - Device-side polling (0/1)
    /// - `RINGBENCH_FIXED_BUFFERS` - Registered buffers (0/1)
    /// - `RINGBENCH_BUFFERED` - Skip O_DIRECT (0/1)
    /// - `RINGBENCH_SQPOLL` - Kernel submission thread (0/1)
    /// - `RINGBENCH_SQPOLL_CPU` - CPU for the submission thread
    /// - `RINGBENCH_SQPOLL_IDLE_MS` - Submission thread idle timeout
    /// - `RINGBENCH_QUEUES` - Submitter threads
    /// - `RINGBENCH_INTERVAL_MS` - Telemetry interval
    pub fn from_env() -> Self {
        Self::from_source(&EnvSource::process())
    }

    /// Defaults overridden by whatever `env` sets.
    pub fn from_source(env: &EnvSource) -> Self {
        let d = Self::default();
        Self {
            depth: env.get("DEPTH", d.depth),
            batch_submit: env.get("BATCH_SUBMIT", d.batch_submit),
            batch_complete: env.get("BATCH_COMPLETE", d.batch_complete),
            block_size: env.get("BLOCK_SIZE", d.block_size),
            polled: env.flag("POLLED", d.polled),
            fixed_buffers: env.flag("FIXED_BUFFERS", d.fixed_buffers),
            buffered: env.flag("BUFFERED", d.buffered),
            sq_thread_poll: env.flag("SQPOLL", d.sq_thread_poll),
            sq_thread_cpu: env.opt("SQPOLL_CPU"),
            sq_thread_idle: env.millis("SQPOLL_IDLE_MS", d.sq_thread_idle),
            queues: env.get("QUEUES", d.queues),
            report_interval: env.millis("INTERVAL_MS", d.report_interval),
        }
    }

    pub fn depth(mut self, n: u32) -> Self {
        self.depth = n;
        self
    }

    pub fn batch_submit(mut self, n: u32) -> Self {
        self.batch_submit = n;
        self
    }

    pub fn batch_complete(mut self, n: u32) -> Self {
        self.batch_complete = n;
        self
    }

    pub fn block_size(mut self, n: u32) -> Self {
        self.block_size = n;
        self
    }

    pub fn polled(mut self, enable: bool) -> Self {
        self.polled = enable;
        self
    }

    pub fn fixed_buffers(mut self, enable: bool) -> Self {
        self.fixed_buffers = enable;
        self
    }

    pub fn buffered(mut self, enable: bool) -> Self {
        self.buffered = enable;
        self
    }

    /// Enable kernel-side submission polling, optionally pinned to `cpu`.
    pub fn sq_thread_poll(mut self, enable: bool, cpu: Option<u32>) -> Self {
        self.sq_thread_poll = enable;
        self.sq_thread_cpu = cpu;
        self
    }

    pub fn queues(mut self, n: usize) -> Self {
        self.queues = n;
        self
    }

    pub fn report_interval(mut self, d: Duration) -> Self {
        self.report_interval = d;
        self
    }

    /// Reject combinations the engine cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.depth == 0 || !self.depth.is_power_of_two() {
            return Err(BenchError::Config(format!(
                "depth {} is not a power of two",
                self.depth
            )));
        }
        if self.depth > MAX_DEPTH {
            return Err(BenchError::Config(format!(
                "depth {} exceeds {}",
                self.depth, MAX_DEPTH
            )));
        }
        if self.batch_submit == 0 || self.batch_submit > self.depth {
            return Err(BenchError::Config(format!(
                "batch_submit {} must be in 1..={}",
                self.batch_submit, self.depth
            )));
        }
        if self.batch_complete == 0 || self.batch_complete > self.depth {
            return Err(BenchError::Config(format!(
                "batch_complete {} must be in 1..={}",
                self.batch_complete, self.depth
            )));
        }
        if self.block_size < 512 || !self.block_size.is_power_of_two() {
            return Err(BenchError::Config(format!(
                "block_size {} must be a power of two >= 512",
                self.block_size
            )));
        }
        if self.sq_thread_cpu.is_some() && !self.sq_thread_poll {
            return Err(BenchError::Config(
                "sq_thread_cpu requires sq_thread_poll".into(),
            ));
        }
        if self.queues == 0 || self.queues > MAX_QUEUES {
            return Err(BenchError::Config(format!(
                "queues {} must be in 1..={}",
                self.queues, MAX_QUEUES
            )));
        }
        if self.report_interval.is_zero() {
            return Err(BenchError::Config("report_interval must be non-zero".into()));
        }
        Ok(())
    }
}

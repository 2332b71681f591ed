//! ringbench: random block reads through a raw io_uring
//!
//! Keeps `--depth` reads in flight per queue against one or more files or
//! block devices and prints one telemetry line per interval:
//!
//! ```text
//! IOPS=412000, IOS/call=8/8, inflight=32, Cachehit=0.00%
//! ```
//!
//! Usage:
//!     cargo build --release -p ringbench
//!     sudo ./target/release/ringbench /dev/nvme0n1
//!     ./target/release/ringbench --no-poll --buffered --depth 64 /tmp/bigfile
//!
//! Defaults come from `RINGBENCH_*` environment variables (see
//! `EngineConfig::from_env`); flags override them. Log verbosity follows
//! `RUST_LOG` (default `info`). Ctrl-C drains outstanding reads and exits.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ringbench_core::config::EngineConfig;
use ringbench_executor::{shutdown, Engine};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ringbench", version, about = "Random-read io_uring benchmark")]
struct Cli {
    /// Ring depth per queue (power of two)
    #[arg(long)]
    depth: Option<u32>,

    /// Descriptors prepared per submission batch
    #[arg(long)]
    batch_submit: Option<u32>,

    /// Completions to wait for once the ring is nearly full
    #[arg(long)]
    batch_complete: Option<u32>,

    /// Bytes per read (power of two, at least 512)
    #[arg(long)]
    block_size: Option<u32>,

    /// Interrupt-driven completions instead of device polling
    #[arg(long)]
    no_poll: bool,

    /// Register the buffer pool and use fixed-buffer reads
    #[arg(long)]
    fixed_buffers: bool,

    /// Go through the page cache (no O_DIRECT)
    #[arg(long)]
    buffered: bool,

    /// Kernel-side submission polling thread
    #[arg(long)]
    sqpoll: bool,

    /// Pin the submission polling thread to this CPU (implies --sqpoll)
    #[arg(long, value_name = "CPU")]
    sqpoll_cpu: Option<u32>,

    /// Independent rings, one thread each
    #[arg(long)]
    queues: Option<usize>,

    /// Telemetry interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Files or block devices to read (at most 16)
    #[arg(required = true, value_name = "TARGET")]
    targets: Vec<PathBuf>,
}

impl Cli {
    /// Apply flags on top of `base`.
    fn apply(&self, base: EngineConfig) -> EngineConfig {
        let mut cfg = base;
        if let Some(n) = self.depth {
            cfg = cfg.depth(n);
        }
        if let Some(n) = self.batch_submit {
            cfg = cfg.batch_submit(n);
        }
        if let Some(n) = self.batch_complete {
            cfg = cfg.batch_complete(n);
        }
        if let Some(n) = self.block_size {
            cfg = cfg.block_size(n);
        }
        if self.no_poll {
            cfg = cfg.polled(false);
        }
        if self.fixed_buffers {
            cfg = cfg.fixed_buffers(true);
        }
        if self.buffered {
            cfg = cfg.buffered(true);
        }
        if self.sqpoll || self.sqpoll_cpu.is_some() {
            let cpu = self.sqpoll_cpu.or(cfg.sq_thread_cpu);
            cfg = cfg.sq_thread_poll(true, cpu);
        }
        if let Some(n) = self.queues {
            cfg = cfg.queues(n);
        }
        if let Some(ms) = self.interval_ms {
            cfg = cfg.report_interval(Duration::from_millis(ms));
        }
        cfg
    }
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    // stdout carries the telemetry lines.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = cli.apply(EngineConfig::from_env());
    tracing::debug!(?config, "effective configuration");

    let engine = Engine::new(config, cli.targets.as_slice()).context("startup failed")?;
    shutdown::install().context("installing SIGINT handler")?;

    let totals = engine.run().context("benchmark aborted")?;
    tracing::info!(done = totals.done, reaped = totals.reaps, "exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_base() {
        let cli = Cli::try_parse_from([
            "ringbench",
            "--depth",
            "64",
            "--no-poll",
            "--sqpoll-cpu",
            "2",
            "--interval-ms",
            "250",
            "/dev/nvme0n1",
            "/dev/nvme1n1",
        ])
        .unwrap();
        let cfg = cli.apply(EngineConfig::default());
        assert_eq!(cfg.depth, 64);
        assert!(!cfg.polled);
        assert!(cfg.sq_thread_poll);
        assert_eq!(cfg.sq_thread_cpu, Some(2));
        assert_eq!(cfg.report_interval, Duration::from_millis(250));
        assert_eq!(cli.targets.len(), 2);
    }

    #[test]
    fn test_unset_flags_keep_base() {
        let cli = Cli::try_parse_from(["ringbench", "/tmp/x"]).unwrap();
        let base = EngineConfig::default().depth(128).buffered(true);
        assert_eq!(cli.apply(base.clone()), base);
    }

    #[test]
    fn test_targets_required() {
        assert!(Cli::try_parse_from(["ringbench"]).is_err());
        assert!(Cli::try_parse_from(["ringbench", "--depth", "64"]).is_err());
    }
}

//! # ringbench-core — Kernel-independent building blocks
//!
//! Everything the ring engine needs that does not touch the kernel:
//! configuration, the error type, the per-queue statistics record and the
//! sampler math, the inflight counter, the cooperative shutdown flags, and
//! the `RingKernel` trait that separates the submitter state machine from
//! the real `io_uring_enter()` call.
//!
//! ## Crate map
//!
//! | Module     | Contents                                        |
//! |------------|-------------------------------------------------|
//! | `config`   | `EngineConfig` (defaults, env overrides, checks) |
//! | `env`      | `EnvSource`: prefixed variable reader            |
//! | `error`    | `BenchError`, `Result`                          |
//! | `inflight` | `Inflight` bounded counter                      |
//! | `kernel`   | `RingKernel`, `EnterOutcome`                    |
//! | `shutdown` | `ShutdownFlags`                                 |
//! | `stats`    | `QueueStats`, `StatsSnapshot`, `Telemetry`      |

pub mod config;
pub mod env;
pub mod error;
pub mod inflight;
pub mod kernel;
pub mod shutdown;
pub mod stats;

pub use config::EngineConfig;
pub use error::{BenchError, Result};

//! # ringbench-executor — The Submitter Loop
//!
//! One `SubmitterLoop` per queue runs on its own thread:
//!
//! ```text
//! loop {
//!     PREP       fill free slots (up to batch_submit), publish the tail
//!     SUBMIT     io_uring_enter(prepared, wait threshold, GETEVENTS)
//!     WAIT_REAP  drain completions, then:
//!                  all accepted     → PREP
//!                  partial          → SUBMIT the remainder
//!                  EAGAIN           → SUBMIT again (or SHUTDOWN if stopping)
//!                  other errno      → fatal
//! }
//! ```
//!
//! The thread that started the engine runs the `StatsReporter`; SIGINT
//! goes through `shutdown`. The loop is generic over `RingKernel`, so
//! tests drive it against a scripted kernel one transition at a time.

pub mod engine;
pub mod reporter;
pub mod shutdown;
pub mod submitter;

pub use engine::Engine;
pub use reporter::StatsReporter;
pub use submitter::{State, SubmitterLoop};

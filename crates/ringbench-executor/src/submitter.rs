//! `SubmitterLoop`: the per-queue worker state machine.
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!   ┌──────► PREP ──(stop, inflight == 0)──► SHUTDOWN     │ all accepted
//!   │         │                                  ▲          │
//!   │         ▼                                  │          │
//!   │      SUBMIT ◄──────────┐        (EAGAIN + stop)       │
//!   │         │              │                   │          │
//!   │         ▼              │ partial / EAGAIN  │          │
//!   │     WAIT_REAP ─────────┴───────────────────┴──────────┘
//!   │         │
//!   └─────────┘ (errno / bad completion: Err, then SHUTDOWN)
//! ```
//!
//! The stop flag is only looked at on entry to PREP. Once it is seen with
//! operations inflight the loop stops preparing and keeps re-entering
//! SUBMIT with zero new descriptors and a blocking threshold until every
//! inflight operation has been reaped.

use std::sync::Arc;

use ringbench_core::config::EngineConfig;
use ringbench_core::error::{BenchError, Result};
use ringbench_core::inflight::Inflight;
use ringbench_core::kernel::{EnterOutcome, RingKernel, ENTER_GETEVENTS};
use ringbench_core::shutdown::ShutdownFlags;
use ringbench_core::stats::QueueStats;
use ringbench_module::{CompletionConsumer, SubmissionProducer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Prep,
    /// Ask the kernel to take `to_submit` already-published descriptors.
    Submit { to_submit: u32 },
    /// Reap, then act on what the kernel said about `to_submit`.
    WaitReap { outcome: EnterOutcome, to_submit: u32 },
    Shutdown,
}

pub struct SubmitterLoop<K: RingKernel> {
    kernel: K,
    producer: SubmissionProducer,
    consumer: CompletionConsumer,
    stats: Arc<QueueStats>,
    shutdown: &'static ShutdownFlags,
    inflight: Inflight,
    /// Published to the submission ring but not yet accepted by the kernel.
    prepared: u32,
    draining: bool,
    batch_submit: u32,
    batch_complete: u32,
    state: State,
}

impl<K: RingKernel> SubmitterLoop<K> {
    pub fn new(
        kernel: K,
        producer: SubmissionProducer,
        consumer: CompletionConsumer,
        stats: Arc<QueueStats>,
        shutdown: &'static ShutdownFlags,
        config: &EngineConfig,
    ) -> Self {
        Self {
            kernel,
            producer,
            consumer,
            stats,
            shutdown,
            inflight: Inflight::new(config.depth),
            prepared: 0,
            draining: false,
            batch_submit: config.batch_submit,
            batch_complete: config.batch_complete,
            state: State::Prep,
        }
    }

    /// Run until SHUTDOWN or a fatal error. Always raises the finish flag.
    pub fn run(&mut self) -> Result<()> {
        let result = loop {
            match self.step() {
                Ok(State::Shutdown) => break Ok(()),
                Ok(_) => {}
                Err(e) => break Err(e),
            }
        };
        self.stats.set_inflight(self.inflight.get());
        self.shutdown.mark_finished();
        result
    }

    /// Perform one transition and return the new state. A fatal error
    /// leaves the loop in SHUTDOWN.
    pub fn step(&mut self) -> Result<State> {
        let next = match self.state {
            State::Prep => Ok(self.prep()),
            State::Submit { to_submit } => Ok(self.submit(to_submit)),
            State::WaitReap { outcome, to_submit } => self.wait_reap(outcome, to_submit),
            State::Shutdown => Ok(State::Shutdown),
        };
        self.state = *next.as_ref().unwrap_or(&State::Shutdown);
        next
    }

    fn prep(&mut self) -> State {
        if self.shutdown.stop_requested() {
            if self.inflight.is_empty() {
                return State::Shutdown;
            }
            self.draining = true;
            return State::Submit { to_submit: self.prepared };
        }

        if self.prepared == 0 && self.inflight.room() > 0 {
            let n = self.producer.prep(self.inflight.room().min(self.batch_submit));
            self.inflight.add(n);
            self.prepared += n;
        }
        self.stats.set_inflight(self.inflight.get());
        State::Submit { to_submit: self.prepared }
    }

    /// Minimum completions to block for when handing `to_submit` entries
    /// over. Zero while the queue has slack.
    ///
    /// Never more than the kernel can produce: the operations it already
    /// holds plus the ones this call gives it. Prepared entries left out of
    /// the call (a zero-entry re-poll) cannot complete.
    fn wait_threshold(&self, to_submit: u32) -> u32 {
        let inflight = self.inflight.get();
        let reachable = inflight - self.prepared + to_submit.min(self.prepared);
        let wanted = if self.draining {
            inflight.min(self.batch_complete)
        } else if inflight + self.batch_submit < self.inflight.capacity() {
            0
        } else {
            (inflight + self.prepared).min(self.batch_complete)
        };
        wanted.min(reachable)
    }

    fn submit(&mut self, to_submit: u32) -> State {
        let wait = self.wait_threshold(to_submit);
        let outcome = self.kernel.enter(to_submit, wait, ENTER_GETEVENTS);
        self.stats.inc_calls();
        State::WaitReap { outcome, to_submit }
    }

    fn wait_reap(&mut self, outcome: EnterOutcome, to_submit: u32) -> Result<State> {
        let reaped = self.consumer.reap(&mut self.inflight, &self.stats)?;
        self.stats.set_inflight(self.inflight.get());

        match outcome {
            EnterOutcome::Accepted(n) => {
                let n = n.min(to_submit);
                self.stats.add_done(n);
                self.prepared -= n;
                if self.prepared == 0 {
                    Ok(State::Prep)
                } else {
                    Ok(State::Submit { to_submit: self.prepared })
                }
            }
            EnterOutcome::WouldBlock => {
                if self.shutdown.stop_requested() {
                    Ok(State::Shutdown)
                } else if reaped > 0 {
                    Ok(State::Submit { to_submit })
                } else {
                    // Nothing moved: poke the kernel with zero entries just
                    // to collect completions.
                    Ok(State::Submit { to_submit: 0 })
                }
            }
            EnterOutcome::Failed(errno) => {
                tracing::error!(errno, "io_uring_enter failed");
                Err(BenchError::Enter(errno))
            }
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn inflight(&self) -> u32 {
        self.inflight.get()
    }

    pub fn prepared(&self) -> u32 {
        self.prepared
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }

    pub fn stats(&self) -> &Arc<QueueStats> {
        &self.stats
    }
}

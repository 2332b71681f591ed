//! The kernel-interaction seam.
//!
//! The submitter state machine only needs one kernel call: "submit N
//! descriptors and wait for at least M completions". `RingKernel` captures
//! that call so the state machine can be driven by the real
//! `io_uring_enter()` or by a scripted fake in tests.

/// `io_uring_enter` flag: wait for completions (IORING_ENTER_GETEVENTS).
pub const ENTER_GETEVENTS: u32 = 1 << 0;
/// `io_uring_enter` flag: wake the kernel submission thread (IORING_ENTER_SQ_WAKEUP).
pub const ENTER_SQ_WAKEUP: u32 = 1 << 1;

/// Result of one kernel-interaction call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterOutcome {
    /// The kernel accepted this many of the requested descriptors.
    Accepted(u32),
    /// EAGAIN: retry later.
    WouldBlock,
    /// Any other errno. Fatal.
    Failed(i32),
}

impl EnterOutcome {
    /// Map a raw `io_uring_enter` return plus errno to an outcome.
    pub fn from_raw(ret: i64, errno: i32) -> Self {
        const EAGAIN: i32 = 11;
        if ret >= 0 {
            EnterOutcome::Accepted(ret as u32)
        } else if errno == EAGAIN {
            EnterOutcome::WouldBlock
        } else {
            EnterOutcome::Failed(errno)
        }
    }
}

/// Submit-and-wait against a ring.
///
/// Implementors own the ring handle (or a fake of it). Descriptors are
/// already published in the submission ring when `enter` is called;
/// `to_submit` tells the kernel how many of them to consume.
pub trait RingKernel: Send {
    /// Submit up to `to_submit` published descriptors and, if `flags`
    /// contains `ENTER_GETEVENTS`, wait until `min_complete` completions
    /// are visible.
    fn enter(&mut self, to_submit: u32, min_complete: u32, flags: u32) -> EnterOutcome;
}

impl<K: RingKernel + ?Sized> RingKernel for Box<K> {
    fn enter(&mut self, to_submit: u32, min_complete: u32, flags: u32) -> EnterOutcome {
        (**self).enter(to_submit, min_complete, flags)
    }
}

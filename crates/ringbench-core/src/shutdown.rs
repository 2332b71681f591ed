//! Cooperative shutdown flags.
//!
//! Two flags, both observed only at loop boundaries:
//!
//! - `stop`: ask submitters to stop preparing new I/O and drain.
//! - `finish`: the run is over; the reporter exits after its current sample.
//!
//! Both are plain `AtomicBool`s with `Relaxed` ordering. They only gate
//! loop continuation and carry no data, and the handler that sets them
//! runs in signal context where only atomic stores are allowed.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ShutdownFlags {
    stop: AtomicBool,
    finish: AtomicBool,
}

impl ShutdownFlags {
    pub const fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            finish: AtomicBool::new(false),
        }
    }

    /// Interrupt: stop submitting and finish the run.
    #[inline]
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.finish.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// A submitter exited (cleanly or not).
    #[inline]
    pub fn mark_finished(&self) {
        self.finish.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finish.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_stop_sets_both() {
        let f = ShutdownFlags::new();
        assert!(!f.stop_requested());
        assert!(!f.is_finished());
        f.request_stop();
        assert!(f.stop_requested());
        assert!(f.is_finished());
    }

    #[test]
    fn test_finish_does_not_imply_stop() {
        let f = ShutdownFlags::new();
        f.mark_finished();
        assert!(f.is_finished());
        assert!(!f.stop_requested());
    }
}

//! Unix SIGINT handler.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{
    pthread_sigmask, sigaction, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal,
};
use ringbench_core::error::{BenchError, Result};
use ringbench_core::shutdown::ShutdownFlags;

/// The flags every queue and the reporter observe.
pub static SHUTDOWN: ShutdownFlags = ShutdownFlags::new();

static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Only atomic stores: this runs in signal context.
extern "C" fn on_interrupt(_sig: libc::c_int) {
    SHUTDOWN.request_stop();
}

/// Install the SIGINT handler. Idempotent.
pub fn install() -> Result<()> {
    if HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    let action = SigAction::new(
        SigHandler::Handler(on_interrupt),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // Safety: the handler only touches atomics.
    unsafe { sigaction(Signal::SIGINT, &action) }.map_err(|e| {
        HANDLER_INSTALLED.store(false, Ordering::SeqCst);
        BenchError::Signal(e as i32)
    })?;
    tracing::debug!("SIGINT handler installed");
    Ok(())
}

pub fn flags() -> &'static ShutdownFlags {
    &SHUTDOWN
}

/// Block SIGINT on the calling thread so it is delivered to the thread
/// running the reporter. A submitter interrupted inside `io_uring_enter`
/// would see EINTR instead of draining.
pub fn block_interrupt() -> Result<()> {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&set), None)
        .map_err(|e| BenchError::Signal(e as i32))
}

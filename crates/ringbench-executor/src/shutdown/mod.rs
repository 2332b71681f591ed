//! ShutdownCoordinator: interrupt handling.
//!
//! SIGINT sets the process-wide `ShutdownFlags`; submitters and the
//! reporter notice at their next loop boundary.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    }
}

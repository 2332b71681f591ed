//! Opcode probe: fail fast if the running kernel cannot do our reads.
//!
//! Uses a throwaway two-entry ring from the `io-uring` crate and
//! `IORING_REGISTER_PROBE`. Kernels that predate the probe register op
//! answer EINVAL; those are let through with a warning and any real gap
//! shows up as a failed completion later.

use io_uring::{IoUring, Probe};

use ringbench_core::error::{BenchError, Result};

use crate::uring_sys::{IORING_OP_READV, IORING_OP_READ_FIXED};

/// The read opcode descriptors will carry.
pub fn read_opcode(fixed_buffers: bool) -> u8 {
    if fixed_buffers {
        IORING_OP_READ_FIXED
    } else {
        IORING_OP_READV
    }
}

/// Check that the kernel supports the read opcode for this mode.
pub fn check_read_opcode(fixed_buffers: bool) -> Result<()> {
    let opcode = read_opcode(fixed_buffers);
    let ring = IoUring::new(2)
        .map_err(|e| BenchError::Setup(e.raw_os_error().unwrap_or(libc::EINVAL)))?;
    let mut probe = Probe::new();
    let supported = match ring.submitter().register_probe(&mut probe) {
        Ok(()) => Some(probe.is_supported(opcode)),
        Err(e) => {
            tracing::warn!(error = %e, "opcode probe unavailable, assuming read support");
            None
        }
    };
    verdict(opcode, supported)
}

fn verdict(opcode: u8, supported: Option<bool>) -> Result<()> {
    match supported {
        Some(false) => Err(BenchError::Unsupported(opcode)),
        Some(true) | None => {
            tracing::debug!(opcode, "read opcode available");
            Ok(())
        }
    }
}

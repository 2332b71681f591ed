//! RingSetup: negotiate a ring with the kernel and map its three windows.

use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;

use ringbench_core::config::EngineConfig;
use ringbench_core::error::{BenchError, Result};
use ringbench_core::kernel::{EnterOutcome, RingKernel, ENTER_SQ_WAKEUP};

use crate::buffer_pool::BufferPool;
use crate::mmap_region::MmapRegion;
use crate::ring::{window_lengths, RingSet};
use crate::uring_sys::{
    io_uring_enter, io_uring_register, io_uring_setup, IoUringParams, IORING_OFF_CQ_RING,
    IORING_OFF_SQES, IORING_OFF_SQ_RING, IORING_REGISTER_BUFFERS, IORING_SETUP_IOPOLL,
    IORING_SETUP_SQPOLL, IORING_SETUP_SQ_AFF,
};

/// Setup parameters for a config: polling flags, kernel thread idle and
/// CPU. Everything else is filled in by the kernel.
pub fn setup_params(config: &EngineConfig) -> IoUringParams {
    let mut p = IoUringParams::default();
    if config.polled {
        p.flags |= IORING_SETUP_IOPOLL;
    }
    if config.sq_thread_poll {
        p.flags |= IORING_SETUP_SQPOLL;
        p.sq_thread_idle = config.sq_thread_idle.as_millis().min(u32::MAX as u128) as u32;
        if let Some(cpu) = config.sq_thread_cpu {
            p.flags |= IORING_SETUP_SQ_AFF;
            p.sq_thread_cpu = cpu;
        }
    }
    p
}

/// One kernel ring: the fd and the mapped views.
///
/// Dropping it unmaps the windows (once every cloned accessor is gone) and
/// closes the fd, which tears the ring down.
pub struct UringHandle {
    fd: OwnedFd,
    rings: RingSet,
    sq_thread_poll: bool,
}

impl UringHandle {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let mut params = setup_params(config);
        let fd = io_uring_setup(config.depth, &mut params)
            .map_err(|e| BenchError::Setup(e.raw_os_error().unwrap_or(libc::EINVAL)))?;
        if params.sq_entries != config.depth {
            return Err(BenchError::Layout("kernel resized the submission ring"));
        }

        let (sq_len, sqes_len, cq_len) = window_lengths(&params);
        let sq_map = MmapRegion::map_ring(fd.as_fd(), sq_len, IORING_OFF_SQ_RING, "sq_ring")?;
        let sqes_map = MmapRegion::map_ring(fd.as_fd(), sqes_len, IORING_OFF_SQES, "sqes")?;
        let cq_map = MmapRegion::map_ring(fd.as_fd(), cq_len, IORING_OFF_CQ_RING, "cq_ring")?;
        for m in [&sq_map, &sqes_map, &cq_map] {
            tracing::debug!(
                window = m.window(),
                base = ?(m.base_addr() as *const u8),
                len = m.len(),
                "mapped ring window"
            );
        }

        let rings = RingSet::from_params(
            &params,
            Arc::new(sq_map),
            Arc::new(sqes_map),
            Arc::new(cq_map),
        )?;
        tracing::info!(
            polled = config.polled,
            fixedbufs = config.fixed_buffers,
            buffered = config.buffered,
            QD = config.depth,
            sq_ring = params.sq_entries,
            cq_ring = params.cq_entries,
            "ring ready"
        );

        Ok(Self { fd, rings, sq_thread_poll: config.sq_thread_poll })
    }

    pub fn rings(&self) -> &RingSet {
        &self.rings
    }

    pub fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Register the pool's buffers so descriptors can use them by index.
    pub fn register_buffers(&self, pool: &BufferPool) -> Result<()> {
        let iovecs = pool.iovecs();
        // Safety: `iovecs` is a live slice of `iovecs.len()` entries for the
        // duration of the call; the kernel pins the memory behind them.
        unsafe {
            io_uring_register(
                self.fd(),
                IORING_REGISTER_BUFFERS,
                iovecs.as_ptr() as *const libc::c_void,
                iovecs.len() as u32,
            )
        }
        .map_err(|e| BenchError::Register(e.raw_os_error().unwrap_or(libc::EINVAL)))?;
        tracing::debug!(buffers = iovecs.len(), "registered fixed buffers");
        Ok(())
    }
}

impl RingKernel for UringHandle {
    fn enter(&mut self, to_submit: u32, min_complete: u32, mut flags: u32) -> EnterOutcome {
        if self.sq_thread_poll && self.rings.sq.needs_wakeup() {
            flags |= ENTER_SQ_WAKEUP;
        }
        io_uring_enter(self.fd(), to_submit, min_complete, flags)
    }
}

/// Lift `RLIMIT_MEMLOCK` so ring memory and registered buffers can be pinned.
pub fn raise_memlock_limit() -> Result<()> {
    use nix::sys::resource::{setrlimit, Resource};

    setrlimit(Resource::RLIMIT_MEMLOCK, libc::RLIM_INFINITY, libc::RLIM_INFINITY)
        .map_err(|e| BenchError::Rlimit(e as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_params_default_polled() {
        let p = setup_params(&EngineConfig::default());
        assert_eq!(p.flags, IORING_SETUP_IOPOLL);
        assert_eq!(p.sq_thread_idle, 0);
    }

    #[test]
    fn test_params_sqpoll_with_cpu() {
        let mut cfg = EngineConfig::default().polled(false).sq_thread_poll(true, Some(3));
        cfg.sq_thread_idle = Duration::from_millis(250);
        let p = setup_params(&cfg);
        assert_eq!(p.flags, IORING_SETUP_SQPOLL | IORING_SETUP_SQ_AFF);
        assert_eq!(p.sq_thread_cpu, 3);
        assert_eq!(p.sq_thread_idle, 250);
    }

    #[test]
    fn test_params_sqpoll_without_cpu() {
        let cfg = EngineConfig::default().sq_thread_poll(true, None);
        let p = setup_params(&cfg);
        assert_eq!(p.flags, IORING_SETUP_IOPOLL | IORING_SETUP_SQPOLL);
        assert_eq!(p.sq_thread_idle, 1000);
    }
}

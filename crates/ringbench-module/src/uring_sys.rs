//! Raw io_uring ABI.
//!
//! Mirrors the parts of `<linux/io_uring.h>` the engine touches: the setup
//! parameter block with its two offset tables, the 64-byte submission
//! descriptor, the 16-byte completion entry, and the three syscalls.
//!
//! Ring field positions are never hard-coded here; they come back from
//! `io_uring_setup()` in `IoUringParams::sq_off` / `cq_off`.

use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use ringbench_core::kernel::EnterOutcome;

// ── Setup flags ──

pub const IORING_SETUP_IOPOLL: u32 = 1 << 0;
pub const IORING_SETUP_SQPOLL: u32 = 1 << 1;
pub const IORING_SETUP_SQ_AFF: u32 = 1 << 2;

// ── mmap offsets ──

pub const IORING_OFF_SQ_RING: i64 = 0;
pub const IORING_OFF_CQ_RING: i64 = 0x0800_0000;
pub const IORING_OFF_SQES: i64 = 0x1000_0000;

// ── Submission ring flags word ──

pub const IORING_SQ_NEED_WAKEUP: u32 = 1 << 0;

// ── Register opcodes ──

pub const IORING_REGISTER_BUFFERS: u32 = 0;

// ── Operation codes ──

pub const IORING_OP_READV: u8 = io_uring::opcode::Readv::CODE;
pub const IORING_OP_READ_FIXED: u8 = io_uring::opcode::ReadFixed::CODE;

// ── Completion flags ──

/// Completion was served from the fast (cached) path.
pub const CQE_F_CACHE_HIT: u32 = 1 << 0;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IoSqringOffsets {
    pub head: u32,
    pub tail: u32,
    pub ring_mask: u32,
    pub ring_entries: u32,
    pub flags: u32,
    pub dropped: u32,
    pub array: u32,
    pub resv1: u32,
    pub user_addr: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IoCqringOffsets {
    pub head: u32,
    pub tail: u32,
    pub ring_mask: u32,
    pub ring_entries: u32,
    pub overflow: u32,
    pub cqes: u32,
    pub flags: u32,
    pub resv1: u32,
    pub user_addr: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IoUringParams {
    pub sq_entries: u32,
    pub cq_entries: u32,
    pub flags: u32,
    pub sq_thread_cpu: u32,
    pub sq_thread_idle: u32,
    pub features: u32,
    pub wq_fd: u32,
    pub resv: [u32; 3],
    pub sq_off: IoSqringOffsets,
    pub cq_off: IoCqringOffsets,
}

/// Submission descriptor (64 bytes).
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IoUringSqe {
    pub opcode: u8,
    pub flags: u8,
    pub ioprio: u16,
    pub fd: i32,
    pub off: u64,
    pub addr: u64,
    pub len: u32,
    pub rw_flags: u32,
    pub user_data: u64,
    pub buf_index: u16,
    pub personality: u16,
    pub splice_fd_in: i32,
    pub addr3: u64,
    pub pad2: u64,
}

/// Completion entry (16 bytes).
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IoUringCqe {
    pub user_data: u64,
    pub res: i32,
    pub flags: u32,
}

const _: () = assert!(std::mem::size_of::<IoUringParams>() == 120);
const _: () = assert!(std::mem::size_of::<IoUringSqe>() == 64);
const _: () = assert!(std::mem::size_of::<IoUringCqe>() == 16);

/// `io_uring_setup(entries, params)`. On success the kernel has filled in
/// `params` (entry counts, features, ring offsets).
pub fn io_uring_setup(entries: u32, params: &mut IoUringParams) -> io::Result<OwnedFd> {
    let ret = unsafe {
        libc::syscall(
            libc::SYS_io_uring_setup,
            entries as libc::c_long,
            params as *mut IoUringParams as libc::c_long,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    // Safety: the kernel just handed us this fd and nothing else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(ret as RawFd) })
}

/// `io_uring_enter(fd, to_submit, min_complete, flags, NULL, 0)`.
pub fn io_uring_enter(fd: RawFd, to_submit: u32, min_complete: u32, flags: u32) -> EnterOutcome {
    let ret = unsafe {
        libc::syscall(
            libc::SYS_io_uring_enter,
            fd as libc::c_long,
            to_submit as libc::c_long,
            min_complete as libc::c_long,
            flags as libc::c_long,
            std::ptr::null::<libc::sigset_t>() as libc::c_long,
            0 as libc::c_long,
        )
    };
    let errno = if ret < 0 {
        io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
    } else {
        0
    };
    EnterOutcome::from_raw(ret as i64, errno)
}

/// `io_uring_register(fd, opcode, arg, nr_args)`.
///
/// # Safety
///
/// `arg` must point to whatever `opcode` expects, `nr_args` elements long,
/// and stay valid for the duration of the call.
pub unsafe fn io_uring_register(
    fd: RawFd,
    opcode: u32,
    arg: *const libc::c_void,
    nr_args: u32,
) -> io::Result<()> {
    let ret = libc::syscall(
        libc::SYS_io_uring_register,
        fd as libc::c_long,
        opcode as libc::c_long,
        arg as libc::c_long,
        nr_args as libc::c_long,
    );
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_sqe_field_offsets() {
        assert_eq!(offset_of!(IoUringSqe, fd), 4);
        assert_eq!(offset_of!(IoUringSqe, off), 8);
        assert_eq!(offset_of!(IoUringSqe, addr), 16);
        assert_eq!(offset_of!(IoUringSqe, len), 24);
        assert_eq!(offset_of!(IoUringSqe, user_data), 32);
        assert_eq!(offset_of!(IoUringSqe, buf_index), 40);
    }

    #[test]
    fn test_params_offset_tables() {
        assert_eq!(offset_of!(IoUringParams, sq_off), 40);
        assert_eq!(offset_of!(IoUringParams, cq_off), 80);
    }

    #[test]
    fn test_read_opcodes() {
        assert_eq!(IORING_OP_READV, 1);
        assert_eq!(IORING_OP_READ_FIXED, 4);
    }
}

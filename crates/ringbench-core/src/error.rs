//! ringbench error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    /// Configuration rejected by `EngineConfig::validate()`.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// io_uring_setup() failed.
    #[error("io_uring setup: errno {0}")]
    Setup(i32),

    /// mmap of a ring window failed.
    #[error("mmap of {window} failed: errno {errno}")]
    Mmap { window: &'static str, errno: i32 },

    /// io_uring_register(IORING_REGISTER_BUFFERS) failed.
    #[error("buffer registration: errno {0}")]
    Register(i32),

    /// setrlimit(RLIMIT_MEMLOCK) failed.
    #[error("raising RLIMIT_MEMLOCK: errno {0}")]
    Rlimit(i32),

    /// Kernel-reported ring layout does not fit the mapped window.
    #[error("ring layout: {0}")]
    Layout(&'static str),

    /// Target could not be opened.
    #[error("open {path}: {source}")]
    TargetOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Target is neither a regular file nor a block device, or sizing failed.
    #[error("failed getting size of {path}: {reason}")]
    TargetSize { path: PathBuf, reason: String },

    /// Target yields fewer than two addressable blocks.
    #[error("{path}: {blocks} block(s) of {block_size} bytes, need at least 2")]
    TargetTooSmall {
        path: PathBuf,
        blocks: u64,
        block_size: u32,
    },

    #[error("too many targets: {given} given, at most {max}")]
    TooManyTargets { given: usize, max: usize },

    #[error("no targets given")]
    NoTargets,

    /// Running kernel does not support a required opcode.
    #[error("kernel does not support io_uring opcode {0}")]
    Unsupported(u8),

    /// io_uring_enter() failed with something other than EAGAIN.
    #[error("io_uring_enter: errno {0}")]
    Enter(i32),

    /// A completion carried a result other than the fixed transfer size.
    #[error("io: unexpected ret={result} (expected {expected})")]
    UnexpectedResult { result: i32, expected: i32 },

    /// Installing the interrupt handler failed.
    #[error("installing signal handler: errno {0}")]
    Signal(i32),

    /// A submitter thread panicked or could not be spawned.
    #[error("submitter thread {queue}: {reason}")]
    WorkerPanic { queue: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Whether this error is a startup failure (before the engine runs).
    pub fn is_startup(&self) -> bool {
        !matches!(
            self,
            Self::Enter(_) | Self::UnexpectedResult { .. } | Self::WorkerPanic { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_result_display() {
        let err = BenchError::UnexpectedResult {
            result: 512,
            expected: 4096,
        };
        assert_eq!(err.to_string(), "io: unexpected ret=512 (expected 4096)");
    }

    #[test]
    fn test_too_small_display_names_path() {
        let err = BenchError::TargetTooSmall {
            path: PathBuf::from("/dev/nvme0n1"),
            blocks: 1,
            block_size: 4096,
        };
        let msg = err.to_string();
        assert!(msg.contains("/dev/nvme0n1"));
        assert!(msg.contains("need at least 2"));
    }

    #[test]
    fn test_startup_classification() {
        assert!(BenchError::Setup(12).is_startup());
        assert!(BenchError::NoTargets.is_startup());
        assert!(!BenchError::Enter(5).is_startup());
        assert!(!BenchError::UnexpectedResult { result: -5, expected: 4096 }.is_startup());
    }
}

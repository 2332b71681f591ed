//! Read targets: files or block devices plus their addressable block count.

use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use ringbench_core::config::MAX_TARGETS;
use ringbench_core::error::{BenchError, Result};

// BLKGETSIZE64 = _IOR(0x12, 114, size_t)
nix::ioctl_read!(blkgetsize64, 0x12, 114, u64);

#[derive(Debug)]
pub struct Target {
    file: File,
    path: PathBuf,
    /// Whole blocks minus the final one. Offsets are drawn from `[0, usable)`.
    usable_blocks: u64,
}

impl Target {
    /// Open `path` read-only (with O_DIRECT unless `buffered`) and size it.
    pub fn open(path: &Path, block_size: u32, buffered: bool) -> Result<Self> {
        let mut opts = OpenOptions::new();
        opts.read(true);
        if !buffered {
            opts.custom_flags(libc::O_DIRECT);
        }
        let file = opts.open(path).map_err(|source| BenchError::TargetOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_file(file, path, block_size)
    }

    /// Size an already-open file or block device.
    pub fn from_file(file: File, path: &Path, block_size: u32) -> Result<Self> {
        let bytes = size_in_bytes(&file, path)?;
        let blocks = bytes / block_size as u64;
        if blocks < 2 {
            return Err(BenchError::TargetTooSmall {
                path: path.to_path_buf(),
                blocks,
                block_size,
            });
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
            usable_blocks: blocks - 1,
        })
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn usable_blocks(&self) -> u64 {
        self.usable_blocks
    }
}

fn size_in_bytes(file: &File, path: &Path) -> Result<u64> {
    let meta = file.metadata().map_err(|e| BenchError::TargetSize {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let ft = meta.file_type();
    if ft.is_file() {
        Ok(meta.len())
    } else if ft.is_block_device() {
        let mut bytes = 0u64;
        // Safety: BLKGETSIZE64 writes one u64 through the pointer.
        unsafe { blkgetsize64(file.as_raw_fd(), &mut bytes) }.map_err(|e| {
            BenchError::TargetSize {
                path: path.to_path_buf(),
                reason: format!("BLKGETSIZE64: {e}"),
            }
        })?;
        Ok(bytes)
    } else {
        Err(BenchError::TargetSize {
            path: path.to_path_buf(),
            reason: "not a regular file or block device".into(),
        })
    }
}

/// The immutable set of open targets, shared by every queue.
#[derive(Debug)]
pub struct TargetSet {
    targets: Vec<Target>,
}

impl TargetSet {
    /// Open every path. Any failure aborts before a ring exists.
    pub fn open<P: AsRef<Path>>(paths: &[P], block_size: u32, buffered: bool) -> Result<Self> {
        if paths.is_empty() {
            return Err(BenchError::NoTargets);
        }
        if paths.len() > MAX_TARGETS {
            return Err(BenchError::TooManyTargets { given: paths.len(), max: MAX_TARGETS });
        }
        let mut targets = Vec::with_capacity(paths.len());
        for p in paths {
            let t = Target::open(p.as_ref(), block_size, buffered)?;
            tracing::info!(path = %t.path().display(), usable_blocks = t.usable_blocks(), "added target");
            targets.push(t);
        }
        Ok(Self { targets })
    }

    pub fn from_targets(targets: Vec<Target>) -> Result<Self> {
        if targets.is_empty() {
            return Err(BenchError::NoTargets);
        }
        if targets.len() > MAX_TARGETS {
            return Err(BenchError::TooManyTargets { given: targets.len(), max: MAX_TARGETS });
        }
        Ok(Self { targets })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize) -> &Target {
        &self.targets[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sized_file(bytes: u64) -> NamedTempFile {
        let f = NamedTempFile::new().unwrap();
        f.as_file().set_len(bytes).unwrap();
        f
    }

    #[test]
    fn test_usable_blocks_excludes_last() {
        let f = sized_file(10 * 4096);
        let t = Target::open(f.path(), 4096, true).unwrap();
        assert_eq!(t.usable_blocks(), 9);
        assert!(t.fd() >= 0);
    }

    #[test]
    fn test_partial_trailing_block_ignored() {
        let f = sized_file(3 * 4096 + 100);
        let t = Target::open(f.path(), 4096, true).unwrap();
        assert_eq!(t.usable_blocks(), 2);
    }

    #[test]
    fn test_too_small_rejected() {
        for bytes in [0, 4096, 2 * 4096 - 1] {
            let f = sized_file(bytes);
            let err = Target::open(f.path(), 4096, true).unwrap_err();
            assert!(matches!(err, BenchError::TargetTooSmall { block_size: 4096, .. }));
            assert!(err.is_startup());
        }
    }

    #[test]
    fn test_two_blocks_is_minimum() {
        let f = sized_file(2 * 512);
        let t = Target::open(f.path(), 512, true).unwrap();
        assert_eq!(t.usable_blocks(), 1);
    }

    #[test]
    fn test_missing_path() {
        let err = Target::open(Path::new("/nonexistent/ringbench/target"), 4096, true).unwrap_err();
        assert!(matches!(err, BenchError::TargetOpen { .. }));
    }

    #[test]
    fn test_directory_is_not_a_target() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::open(dir.path()).unwrap();
        let err = Target::from_file(file, dir.path(), 4096).unwrap_err();
        assert!(matches!(err, BenchError::TargetSize { .. }));
    }

    #[test]
    fn test_set_limits() {
        let none: [&Path; 0] = [];
        assert!(matches!(TargetSet::open(&none[..], 4096, true), Err(BenchError::NoTargets)));

        let f = sized_file(4 * 4096);
        let paths = vec![f.path().to_path_buf(); MAX_TARGETS + 1];
        assert!(matches!(
            TargetSet::open(&paths[..], 4096, true),
            Err(BenchError::TooManyTargets { given: 17, max: 16 })
        ));

        let set = TargetSet::open(&paths[..2], 4096, true).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(1).usable_blocks(), 3);
    }
}

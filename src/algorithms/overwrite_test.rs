/// Tests for the block-wise overwrite executor
///
/// Tests verify:
/// - Bytes written per pass and across passes
/// - Final partial block truncation
/// - Flush cadence
/// - Mid-operation failures (write error, extent change, cancellation)

#[cfg(test)]
mod overwrite_executor_tests {
    use crate::algorithms::overwrite::{OverwriteExecutor, OverwriteReport};
    use crate::algorithms::policy::BytePattern;
    use crate::error::Deadline;
    use crate::io::{DeviceAccess, FileDeviceAccess, TargetHandle};
    use crate::{CancelFlag, WipeError, WipeResult};
    use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// In-memory extent with scripted faults
    struct ScriptedHandle {
        data: Cursor<Vec<u8>>,
        fail_write_after: Option<u64>,
        grow_after_sync: bool,
        writes: u64,
        syncs: Arc<AtomicU64>,
    }

    impl Read for ScriptedHandle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.data.read(buf)
        }
    }

    impl Seek for ScriptedHandle {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.data.seek(pos)
        }
    }

    impl Write for ScriptedHandle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(limit) = self.fail_write_after {
                if self.writes >= limit {
                    return Err(io::Error::new(io::ErrorKind::Other, "media error"));
                }
            }
            self.writes += 1;
            self.data.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl TargetHandle for ScriptedHandle {
        fn size(&self) -> io::Result<u64> {
            Ok(self.data.get_ref().len() as u64)
        }

        fn sync(&mut self) -> io::Result<()> {
            self.syncs.fetch_add(1, Ordering::SeqCst);
            if self.grow_after_sync {
                self.data.get_mut().extend_from_slice(&[0u8; 16]);
            }
            Ok(())
        }
    }

    struct ScriptedAccess {
        size: usize,
        fail_write_after: Option<u64>,
        grow_after_sync: bool,
        syncs: Arc<AtomicU64>,
    }

    impl ScriptedAccess {
        fn new(size: usize) -> Self {
            Self {
                size,
                fail_write_after: None,
                grow_after_sync: false,
                syncs: Arc::new(AtomicU64::new(0)),
            }
        }
    }

    impl DeviceAccess for ScriptedAccess {
        fn open_rw(&self, _target: &Path) -> WipeResult<Box<dyn TargetHandle>> {
            Ok(Box::new(ScriptedHandle {
                data: Cursor::new(vec![0xAB; self.size]),
                fail_write_after: self.fail_write_after,
                grow_after_sync: self.grow_after_sync,
                writes: 0,
                syncs: self.syncs.clone(),
            }))
        }

        fn open_read(&self, target: &Path) -> WipeResult<Box<dyn TargetHandle>> {
            self.open_rw(target)
        }

        fn size(&self, _target: &Path) -> WipeResult<u64> {
            Ok(self.size as u64)
        }

        fn exists(&self, _target: &Path) -> WipeResult<bool> {
            Ok(true)
        }

        fn detach(&self, target: &Path, _tag: &str) -> WipeResult<PathBuf> {
            Ok(target.to_path_buf())
        }

        fn provision(&self, _target: &Path, _size: u64) -> WipeResult<()> {
            Ok(())
        }
    }

    fn write_target(dir: &TempDir, name: &str, len: usize) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, vec![0xAB; len]).unwrap();
        path
    }

    #[test]
    fn test_three_pass_purge_writes_three_extents() {
        let dir = TempDir::new().unwrap();
        let target = write_target(&dir, "hdd.img", 4096);
        let access = FileDeviceAccess::new();
        let cycle = [0x00u8, 0xFF, 0x00];

        let report = OverwriteExecutor::new(&access)
            .overwrite(&target, |pass| BytePattern::byte(cycle[pass as usize]), 3, 512)
            .unwrap();

        assert_eq!(report.extent_size, 4096);
        assert_eq!(report.passes_completed, 3);
        assert_eq!(report.bytes_written, 12288);
        assert_eq!(
            report.pass_patterns,
            vec![
                BytePattern::byte(0x00),
                BytePattern::byte(0xFF),
                BytePattern::byte(0x00)
            ]
        );

        let content = std::fs::read(&target).unwrap();
        assert_eq!(content.len(), 4096);
        assert!(content.iter().all(|&b| b == 0x00));
    }

    #[test]
    fn test_partial_final_block_does_not_extend_extent() {
        let dir = TempDir::new().unwrap();
        let target = write_target(&dir, "odd.img", 1000);
        let access = FileDeviceAccess::new();

        let report = OverwriteExecutor::new(&access)
            .overwrite(&target, |_| BytePattern::byte(0xFF), 1, 384)
            .unwrap();

        assert_eq!(report.bytes_written, 1000);
        let content = std::fs::read(&target).unwrap();
        assert_eq!(content.len(), 1000);
        assert!(content.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_multi_byte_pattern_is_continuous_across_blocks() {
        let dir = TempDir::new().unwrap();
        let target = write_target(&dir, "tiled.img", 10);
        let access = FileDeviceAccess::new();
        let pattern = BytePattern::new(vec![1, 2, 3]).unwrap();

        OverwriteExecutor::new(&access)
            .overwrite(&target, |_| pattern.clone(), 1, 4)
            .unwrap();

        assert_eq!(
            std::fs::read(&target).unwrap(),
            vec![1, 2, 3, 1, 2, 3, 1, 2, 3, 1]
        );
    }

    #[test]
    fn test_flushes_periodically_and_per_pass() {
        // 250 blocks per pass, flush every 100 blocks: 2 periodic + 1 end-of-pass
        let access = ScriptedAccess::new(250 * 16);

        OverwriteExecutor::new(&access)
            .overwrite(Path::new("scripted"), |_| BytePattern::byte(0), 2, 16)
            .unwrap();

        assert_eq!(access.syncs.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_write_failure_mid_pass_is_io_failure() {
        let mut access = ScriptedAccess::new(64 * 10);
        access.fail_write_after = Some(15);
        let mut report = OverwriteReport::default();

        let result = OverwriteExecutor::new(&access).overwrite_into(
            Path::new("scripted"),
            |_| BytePattern::byte(0),
            3,
            64,
            &mut report,
        );

        assert!(matches!(result, Err(WipeError::IoFailure(_))));
        // First pass (10 writes) finished before the fault
        assert_eq!(report.passes_completed, 1);
        assert_eq!(report.bytes_written, 640);
    }

    #[test]
    fn test_extent_change_between_passes_fails() {
        let mut access = ScriptedAccess::new(256);
        access.grow_after_sync = true;

        let result = OverwriteExecutor::new(&access).overwrite(
            Path::new("scripted"),
            |_| BytePattern::byte(0),
            2,
            64,
        );

        match result {
            Err(WipeError::IoFailure(msg)) => assert!(msg.contains("extent changed")),
            other => panic!("expected IoFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_target_is_target_access_error() {
        let dir = TempDir::new().unwrap();
        let access = FileDeviceAccess::new();

        let result = OverwriteExecutor::new(&access).overwrite(
            &dir.path().join("missing.img"),
            |_| BytePattern::byte(0),
            1,
            512,
        );

        assert!(matches!(result, Err(WipeError::TargetNotFound(_))));
    }

    #[test]
    fn test_zero_block_size_is_rejected() {
        let access = ScriptedAccess::new(64);
        let result = OverwriteExecutor::new(&access).overwrite(
            Path::new("scripted"),
            |_| BytePattern::byte(0),
            1,
            0,
        );
        assert!(matches!(result, Err(WipeError::InvalidInput(_))));
    }

    #[test]
    fn test_cancellation_stops_between_blocks() {
        let access = ScriptedAccess::new(4096);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = OverwriteExecutor::new(&access)
            .with_cancel_flag(&cancel)
            .overwrite(Path::new("scripted"), |_| BytePattern::byte(0), 1, 512);

        assert_eq!(result, Err(WipeError::Interrupted));
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let access = ScriptedAccess::new(4096);
        let deadline = Deadline::after(Duration::ZERO);

        let result = OverwriteExecutor::new(&access)
            .with_deadline(&deadline)
            .overwrite(Path::new("scripted"), |_| BytePattern::byte(0), 1, 512);

        assert!(matches!(result, Err(WipeError::Timeout(_))));
    }

    #[test]
    fn test_empty_extent_completes_with_zero_bytes() {
        let access = ScriptedAccess::new(0);

        let report = OverwriteExecutor::new(&access)
            .overwrite(Path::new("scripted"), |_| BytePattern::byte(0), 3, 512)
            .unwrap();

        assert_eq!(report.passes_completed, 3);
        assert_eq!(report.bytes_written, 0);
    }
}

use super::policy::BytePattern;
use crate::error::Deadline;
use crate::io::{DeviceAccess, TargetHandle};
use crate::{CancelFlag, WipeError, WipeResult};
use std::io::SeekFrom;
use std::path::Path;

/// Blocks written between durability flushes within one pass
pub const DEFAULT_FLUSH_INTERVAL_BLOCKS: u64 = 100;

/// What an overwrite accomplished, including partial progress on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverwriteReport {
    /// Extent size measured before the first pass
    pub extent_size: u64,
    pub passes_completed: u32,
    pub bytes_written: u64,
    /// Resolved pattern of each completed pass, in order
    pub pass_patterns: Vec<BytePattern>,
}

impl OverwriteReport {
    pub fn final_pattern(&self) -> Option<&BytePattern> {
        self.pass_patterns.last()
    }
}

/// Block-wise multi-pass overwrite of a single target.
///
/// The executor owns the target for the duration of the call; callers must
/// make sure nothing else reads or writes it concurrently.
pub struct OverwriteExecutor<'a> {
    access: &'a dyn DeviceAccess,
    flush_interval_blocks: u64,
    cancel: Option<&'a CancelFlag>,
    deadline: Option<&'a Deadline>,
}

impl<'a> OverwriteExecutor<'a> {
    pub fn new(access: &'a dyn DeviceAccess) -> Self {
        Self {
            access,
            flush_interval_blocks: DEFAULT_FLUSH_INTERVAL_BLOCKS,
            cancel: None,
            deadline: None,
        }
    }

    pub fn with_flush_interval(mut self, blocks: u64) -> Self {
        self.flush_interval_blocks = blocks.max(1);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: &'a CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_deadline(mut self, deadline: &'a Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Overwrite `target` with `required_passes` passes and return bytes written.
    pub fn overwrite<F>(
        &self,
        target: &Path,
        pattern_for_pass: F,
        required_passes: u32,
        block_size: usize,
    ) -> WipeResult<OverwriteReport>
    where
        F: FnMut(u32) -> BytePattern,
    {
        let mut report = OverwriteReport::default();
        self.overwrite_into(target, pattern_for_pass, required_passes, block_size, &mut report)?;
        Ok(report)
    }

    /// Like [`overwrite`](Self::overwrite) but records progress into `report`
    /// as it goes, so a caller still sees completed passes after a failure.
    pub fn overwrite_into<F>(
        &self,
        target: &Path,
        mut pattern_for_pass: F,
        required_passes: u32,
        block_size: usize,
        report: &mut OverwriteReport,
    ) -> WipeResult<()>
    where
        F: FnMut(u32) -> BytePattern,
    {
        if block_size == 0 {
            return Err(WipeError::InvalidInput(
                "block size must be positive".to_string(),
            ));
        }
        if required_passes == 0 {
            return Err(WipeError::InvalidInput(
                "at least one pass is required".to_string(),
            ));
        }

        let mut handle = self.access.open_rw(target)?;
        let extent_size = handle
            .size()
            .map_err(|e| WipeError::io("failed to measure target extent", &e))?;
        report.extent_size = extent_size;

        let mut buffer = vec![0u8; block_size];

        for pass in 0..required_passes {
            Self::ensure_extent_unchanged(&*handle, extent_size, &format!("before pass {}", pass + 1))?;
            let pattern = pattern_for_pass(pass);

            tracing::debug!(
                path = %target.display(),
                pass = pass + 1,
                of = required_passes,
                pattern = %pattern,
                "Starting overwrite pass"
            );

            self.write_pass(&mut *handle, &pattern, extent_size, &mut buffer)?;

            report.passes_completed += 1;
            report.bytes_written += extent_size;
            report.pass_patterns.push(pattern);
        }

        Self::ensure_extent_unchanged(&*handle, extent_size, "after final pass")?;
        Ok(())
    }

    fn write_pass(
        &self,
        handle: &mut dyn TargetHandle,
        pattern: &BytePattern,
        extent_size: u64,
        buffer: &mut [u8],
    ) -> WipeResult<()> {
        handle
            .seek(SeekFrom::Start(0))
            .map_err(|e| WipeError::io("seek to start of extent failed", &e))?;

        let block_size = buffer.len() as u64;
        let mut offset = 0u64;
        let mut blocks = 0u64;

        while offset < extent_size {
            self.check_abort()?;

            let chunk = (extent_size - offset).min(block_size) as usize;
            pattern.fill_at(&mut buffer[..chunk], offset);
            handle
                .write_all(&buffer[..chunk])
                .map_err(|e| WipeError::io(&format!("write failed at offset {}", offset), &e))?;

            offset += chunk as u64;
            blocks += 1;

            if blocks % self.flush_interval_blocks == 0 {
                handle
                    .sync()
                    .map_err(|e| WipeError::io("periodic flush failed", &e))?;
            }
        }

        handle
            .sync()
            .map_err(|e| WipeError::io("end-of-pass flush failed", &e))
    }

    fn check_abort(&self) -> WipeResult<()> {
        if self.cancel.map_or(false, |c| c.is_cancelled()) {
            return Err(WipeError::Interrupted);
        }
        if let Some(deadline) = self.deadline {
            if deadline.is_expired() {
                return Err(WipeError::Timeout(format!(
                    "overwrite exceeded its deadline after {:?}",
                    deadline.elapsed()
                )));
            }
        }
        Ok(())
    }

    fn ensure_extent_unchanged(handle: &dyn TargetHandle, expected: u64, when: &str) -> WipeResult<()> {
        let current = handle
            .size()
            .map_err(|e| WipeError::io("failed to re-measure target extent", &e))?;
        if current != expected {
            return Err(WipeError::IoFailure(format!(
                "target extent changed from {} to {} bytes {}",
                expected, current, when
            )));
        }
        Ok(())
    }
}

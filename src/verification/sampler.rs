use crate::algorithms::policy::BytePattern;
use crate::io::DeviceAccess;
use crate::{WipeError, WipeResult};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Upper bound on samples taken across an extent
pub const MAX_SAMPLES: u64 = 10;

/// Extents smaller than `MAX_SAMPLES * MIN_SAMPLE_SPACING` get fewer samples
pub const MIN_SAMPLE_SPACING: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    /// Offsets inspected, in order
    pub sampled_offsets: Vec<u64>,
    /// Absolute offset of the first byte that did not match
    pub mismatch_at: Option<u64>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.mismatch_at.is_none()
    }
}

/// Post-wipe conformance check by sampling.
pub struct WipeVerifier<'a> {
    access: &'a dyn DeviceAccess,
}

impl<'a> WipeVerifier<'a> {
    pub fn new(access: &'a dyn DeviceAccess) -> Self {
        Self { access }
    }

    /// Evenly spaced offsets: up to 10, one per KiB of extent, at least one
    /// for a non-empty extent.
    pub fn sample_offsets(extent_size: u64) -> Vec<u64> {
        if extent_size == 0 {
            return Vec::new();
        }

        let count = (extent_size / MIN_SAMPLE_SPACING).clamp(1, MAX_SAMPLES);
        (0..count)
            .map(|i| (i as u128 * extent_size as u128 / count as u128) as u64)
            .collect()
    }

    /// `Ok(false)` on a content mismatch; `Err(Verification)` if reading fails.
    pub fn verify(&self, target: &Path, expected: &BytePattern, extent_size: u64) -> WipeResult<bool> {
        Ok(self.inspect(target, expected, extent_size)?.passed())
    }

    pub fn inspect(
        &self,
        target: &Path,
        expected: &BytePattern,
        extent_size: u64,
    ) -> WipeResult<VerificationReport> {
        let mut handle = self
            .access
            .open_read(target)
            .map_err(|e| WipeError::Verification(e.to_string()))?;

        let mut report = VerificationReport {
            sampled_offsets: Vec::new(),
            mismatch_at: None,
        };

        for offset in Self::sample_offsets(extent_size) {
            let window = (expected.len() as u64).min(extent_size - offset) as usize;
            let mut buf = vec![0u8; window];

            handle
                .seek(SeekFrom::Start(offset))
                .map_err(|e| WipeError::Verification(format!("seek to {} failed: {}", offset, e)))?;
            handle
                .read_exact(&mut buf)
                .map_err(|e| WipeError::Verification(format!("read at {} failed: {}", offset, e)))?;

            report.sampled_offsets.push(offset);

            if let Some(index) = expected.first_mismatch(&buf, offset) {
                let at = offset + index as u64;
                tracing::warn!(
                    path = %target.display(),
                    offset = at,
                    expected = %expected,
                    "Verification mismatch"
                );
                report.mismatch_at = Some(at);
                break;
            }
        }

        Ok(report)
    }

    /// A destroyed target passes when its original identity no longer resolves.
    pub fn verify_destroyed(&self, original: &Path) -> bool {
        matches!(self.access.exists(original), Ok(false))
    }
}

use crate::{DeviceClass, WipeMethod};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes written by one pass, tiled continuously across the extent.
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BytePattern(Vec<u8>);

impl BytePattern {
    /// Returns `None` for an empty pattern.
    pub fn new(bytes: Vec<u8>) -> Option<Self> {
        if bytes.is_empty() {
            None
        } else {
            Some(Self(bytes))
        }
    }

    pub fn byte(value: u8) -> Self {
        Self(vec![value])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Fill `buf` with the pattern as it appears at absolute `offset`.
    pub fn fill_at(&self, buf: &mut [u8], offset: u64) {
        if let [single] = self.0.as_slice() {
            buf.fill(*single);
            return;
        }

        let len = self.0.len();
        let mut phase = (offset % len as u64) as usize;
        for byte in buf.iter_mut() {
            *byte = self.0[phase];
            phase += 1;
            if phase == len {
                phase = 0;
            }
        }
    }

    /// Index of the first byte in `window` (read at absolute `offset`) that
    /// differs from the pattern.
    pub fn first_mismatch(&self, window: &[u8], offset: u64) -> Option<usize> {
        let len = self.0.len() as u64;
        (0..window.len())
            .find(|&i| window[i] != self.0[((offset + i as u64) % len) as usize])
    }
}

impl fmt::Display for BytePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for byte in &self.0 {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Pattern descriptor for one pass, before any randomness is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternSpec {
    Fixed(u8),
    /// One byte drawn at random when the pass starts
    RandomByte,
}

impl PatternSpec {
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> BytePattern {
        match self {
            PatternSpec::Fixed(value) => BytePattern::byte(*value),
            PatternSpec::RandomByte => BytePattern::byte(rng.gen()),
        }
    }
}

impl fmt::Display for PatternSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternSpec::Fixed(value) => write!(f, "0x{:02X}", value),
            PatternSpec::RandomByte => f.write_str("random"),
        }
    }
}

/// Compliance pass table and per-pass patterns.
///
/// | Method  | HDD | SSD | USB | NVMe | SDCard | Other |
/// |---------|-----|-----|-----|------|--------|-------|
/// | CLEAR   | 1   | 1   | 1   | 1    | 1      | 1     |
/// | PURGE   | 3   | 1   | 3   | 1    | 3      | 3     |
/// | DESTROY | 1   | 1   | 1   | 1    | 1      | 1     |
///
/// Purge of SSD/NVMe is a single random pass standing in for a
/// cryptographic erase; no flash translation layer remnants are claimed erased.
pub struct PatternPolicy;

impl PatternPolicy {
    /// Cycle used by multi-pass purge, indexed by `pass mod 3`
    pub const PURGE_CYCLE: [u8; 3] = [0x00, 0xFF, 0x00];

    pub const MULTI_PASS_PURGE_COUNT: u32 = 3;

    pub fn required_passes(method: WipeMethod, class: DeviceClass) -> u32 {
        match method {
            WipeMethod::Clear | WipeMethod::Destroy => 1,
            WipeMethod::Purge if class.is_flash() => 1,
            WipeMethod::Purge => Self::MULTI_PASS_PURGE_COUNT,
        }
    }

    /// DESTROY never overwrites; its pattern is reported as zeros.
    pub fn pattern_for_pass(method: WipeMethod, class: DeviceClass, pass_index: u32) -> PatternSpec {
        match method {
            WipeMethod::Clear | WipeMethod::Destroy => PatternSpec::Fixed(0x00),
            WipeMethod::Purge if class.is_flash() => PatternSpec::RandomByte,
            WipeMethod::Purge => {
                PatternSpec::Fixed(Self::PURGE_CYCLE[(pass_index % 3) as usize])
            }
        }
    }

    /// Every pass of a wipe, in order.
    pub fn plan(method: WipeMethod, class: DeviceClass) -> Vec<PatternSpec> {
        (0..Self::required_passes(method, class))
            .map(|pass| Self::pattern_for_pass(method, class, pass))
            .collect()
    }
}

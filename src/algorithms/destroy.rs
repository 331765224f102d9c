//! Simulated physical destruction.
//!
//! Destruction is not an overwrite: the target is detached from its original
//! identity (renamed) after a wait that models the time a physical process
//! takes. Its verification is an existence check rather than a content check.

use crate::error::{Deadline, Sleeper};
use crate::io::DeviceAccess;
use crate::{WipeError, WipeResult};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Declared bytes that account for one time unit of destruction
pub const BYTES_PER_TIME_UNIT: u64 = 1024 * 1024;

pub const MIN_TIME_UNITS: u64 = 1;
pub const MAX_TIME_UNITS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyReport {
    pub extent_size: u64,
    pub detached_to: PathBuf,
    pub simulated_duration: Duration,
}

pub struct DestroyAction<'a> {
    access: &'a dyn DeviceAccess,
    sleeper: &'a dyn Sleeper,
    time_unit: Duration,
}

impl<'a> DestroyAction<'a> {
    pub fn new(access: &'a dyn DeviceAccess, sleeper: &'a dyn Sleeper, time_unit: Duration) -> Self {
        Self {
            access,
            sleeper,
            time_unit,
        }
    }

    /// Time units for a declared size, clamped to 1..=10.
    pub fn time_units(declared_size: u64) -> u64 {
        (declared_size / BYTES_PER_TIME_UNIT).clamp(MIN_TIME_UNITS, MAX_TIME_UNITS)
    }

    pub fn simulated_duration(&self, declared_size: u64) -> Duration {
        self.time_unit
            .saturating_mul(Self::time_units(declared_size) as u32)
    }

    /// Destroy `target`. The size used for timing is the declared capacity
    /// when known, otherwise the measured extent.
    pub fn execute(
        &self,
        target: &Path,
        declared_capacity: Option<u64>,
        deadline: &Deadline,
    ) -> WipeResult<DestroyReport> {
        let extent_size = self.access.size(target)?;
        let duration = self.simulated_duration(declared_capacity.unwrap_or(extent_size));

        tracing::info!(
            path = %target.display(),
            extent_size,
            duration_ms = duration.as_millis() as u64,
            "Simulating physical destruction"
        );

        let (wait, cut_short) = deadline.clamp(duration);
        self.sleeper.sleep(wait);
        if cut_short {
            return Err(WipeError::Timeout(format!(
                "destruction of {} did not finish before the deadline",
                target.display()
            )));
        }

        let detached_to = self
            .access
            .detach(target, &Utc::now().timestamp().to_string())?;

        Ok(DestroyReport {
            extent_size,
            detached_to,
            simulated_duration: duration,
        })
    }
}

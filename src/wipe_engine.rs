// Wipe engine - composes pattern policy, overwrite, destruction and
// verification into a single call that always yields a WipeOutcome.

use crate::algorithms::destroy::DestroyAction;
use crate::algorithms::overwrite::{OverwriteExecutor, OverwriteReport, DEFAULT_FLUSH_INTERVAL_BLOCKS};
use crate::algorithms::policy::{PatternPolicy, PatternSpec};
use crate::error::{Deadline, Sleeper, ThreadSleeper};
use crate::io::{DeviceAccess, FileDeviceAccess};
use crate::verification::WipeVerifier;
use crate::{
    CancelFlag, DeviceClass, DeviceDescriptor, WipeDirective, WipeError, WipeErrorKind, WipeMethod,
    WipeOutcome, WipeResult,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_OPERATOR_ID: &str = "wipe-ledger";

/// Default time unit of simulated destruction
pub const DEFAULT_DESTROY_TIME_UNIT: Duration = Duration::from_secs(1);

/// Phases of one wipe. `Failed` is reachable from every other phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WipePhase {
    Validating,
    Overwriting { pass: u32, of: u32 },
    Destroying,
    Verifying,
    Completed,
    Failed,
}

impl fmt::Display for WipePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WipePhase::Validating => write!(f, "validating"),
            WipePhase::Overwriting { pass, of } => write!(f, "overwriting pass {}/{}", pass, of),
            WipePhase::Destroying => write!(f, "destroying"),
            WipePhase::Verifying => write!(f, "verifying"),
            WipePhase::Completed => write!(f, "completed"),
            WipePhase::Failed => write!(f, "failed"),
        }
    }
}

/// How a validated target is disposed of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WipeAction {
    /// Pattern passes, verified by content sampling
    Overwrite { patterns: Vec<PatternSpec> },
    /// Detach the target, verified by an existence check
    Destroy,
}

impl WipeAction {
    pub fn plan(method: WipeMethod, class: DeviceClass) -> Self {
        match method {
            WipeMethod::Destroy => WipeAction::Destroy,
            WipeMethod::Clear | WipeMethod::Purge => WipeAction::Overwrite {
                patterns: PatternPolicy::plan(method, class),
            },
        }
    }
}

/// Progress accumulated while running; survives a mid-way failure.
#[derive(Debug, Default)]
struct Progress {
    passes_completed: u32,
    bytes_wiped: u64,
    verified: Option<bool>,
    mismatch: Option<String>,
}

/// Fields covered by the operation digest, in a fixed order.
#[derive(Serialize)]
struct DigestInput<'a> {
    operation_id: &'a str,
    device_id: &'a str,
    method: WipeMethod,
    passes_completed: u32,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    bytes_wiped: u64,
}

/// Deterministic SHA-256 over the identifying fields of an outcome.
pub fn operation_digest(outcome: &WipeOutcome) -> Result<String, serde_json::Error> {
    let input = DigestInput {
        operation_id: &outcome.operation_id,
        device_id: &outcome.device_id,
        method: outcome.method,
        passes_completed: outcome.passes_completed,
        start_time: outcome.start_time,
        end_time: outcome.end_time,
        bytes_wiped: outcome.bytes_wiped,
    };
    let payload = serde_json::to_vec(&input)?;
    Ok(format!("{:x}", Sha256::digest(&payload)))
}

/// The wipe algorithm: validate, overwrite or destroy, optionally verify.
pub struct WipeEngine {
    access: Arc<dyn DeviceAccess>,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancelFlag,
    operator_id: String,
    destroy_time_unit: Duration,
    scratch_size: Option<u64>,
    flush_interval_blocks: u64,
}

impl Default for WipeEngine {
    fn default() -> Self {
        Self::new(Arc::new(FileDeviceAccess::new()))
    }
}

impl WipeEngine {
    pub fn new(access: Arc<dyn DeviceAccess>) -> Self {
        Self {
            access,
            sleeper: Arc::new(ThreadSleeper),
            cancel: CancelFlag::new(),
            operator_id: DEFAULT_OPERATOR_ID.to_string(),
            destroy_time_unit: DEFAULT_DESTROY_TIME_UNIT,
            scratch_size: None,
            flush_interval_blocks: DEFAULT_FLUSH_INTERVAL_BLOCKS,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_operator_id(mut self, operator_id: impl Into<String>) -> Self {
        self.operator_id = operator_id.into();
        self
    }

    pub fn with_destroy_time_unit(mut self, unit: Duration) -> Self {
        self.destroy_time_unit = unit;
        self
    }

    /// Provision missing targets as random-filled scratch files of `size` bytes.
    pub fn with_scratch_provisioning(mut self, size: Option<u64>) -> Self {
        self.scratch_size = size;
        self
    }

    pub fn with_flush_interval(mut self, blocks: u64) -> Self {
        self.flush_interval_blocks = blocks.max(1);
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn access(&self) -> &Arc<dyn DeviceAccess> {
        &self.access
    }

    /// Wipe `target` under the directive's own timeout.
    pub fn wipe(&self, target: &Path, device: &DeviceDescriptor, directive: &WipeDirective) -> WipeOutcome {
        self.wipe_until(target, device, directive, &Deadline::after(directive.timeout))
    }

    /// Wipe `target` bounded by an externally owned deadline.
    ///
    /// Never returns an error: every failure is captured in the outcome.
    pub fn wipe_until(
        &self,
        target: &Path,
        device: &DeviceDescriptor,
        directive: &WipeDirective,
        deadline: &Deadline,
    ) -> WipeOutcome {
        self.wipe_operation(&Uuid::new_v4().to_string(), target, device, directive, deadline)
    }

    /// Same as [`WipeEngine::wipe_until`] with a caller-chosen operation id.
    pub fn wipe_operation(
        &self,
        operation_id: &str,
        target: &Path,
        device: &DeviceDescriptor,
        directive: &WipeDirective,
        deadline: &Deadline,
    ) -> WipeOutcome {
        let operation_id = operation_id.to_string();
        let start_time = Utc::now();
        let mut progress = Progress::default();

        let span = tracing::info_span!(
            "wipe",
            operation_id = %operation_id,
            device_id = %device.id(),
            method = %directive.method
        );
        let _enter = span.enter();

        let result = self.run(target, device, directive, deadline, &mut progress);

        let mut outcome = WipeOutcome {
            operation_id,
            device_id: device.id().to_string(),
            method: directive.method,
            operator_id: self.operator_id.clone(),
            passes_completed: progress.passes_completed,
            bytes_wiped: progress.bytes_wiped,
            start_time,
            end_time: Utc::now(),
            success: false,
            verified: progress.verified,
            verification_digest: None,
            error_reason: None,
            error_kind: None,
        };

        match result {
            Ok(()) if progress.verified == Some(false) => {
                outcome.error_kind = Some(WipeErrorKind::VerificationMismatch);
                outcome.error_reason = progress.mismatch.take();
                Self::log_phase(WipePhase::Failed);
            }
            Ok(()) => {
                outcome.success = true;
                if directive.verify_after_write {
                    match operation_digest(&outcome) {
                        Ok(digest) => outcome.verification_digest = Some(digest),
                        Err(e) => tracing::warn!(error = %e, "Could not compute operation digest"),
                    }
                }
                Self::log_phase(WipePhase::Completed);
                tracing::info!(
                    passes = outcome.passes_completed,
                    bytes = outcome.bytes_wiped,
                    "Wipe completed"
                );
            }
            Err(error) => {
                outcome.error_kind = Some(error.kind());
                outcome.error_reason = Some(error.to_string());
                Self::log_phase(WipePhase::Failed);
                tracing::warn!(error = %error, "Wipe failed");
            }
        }

        outcome
    }

    fn run(
        &self,
        target: &Path,
        device: &DeviceDescriptor,
        directive: &WipeDirective,
        deadline: &Deadline,
        progress: &mut Progress,
    ) -> WipeResult<()> {
        Self::log_phase(WipePhase::Validating);
        directive.validate()?;
        self.validate_target(target)?;

        let required = PatternPolicy::required_passes(directive.method, device.class());
        if let Some(requested) = directive.requested_passes {
            if requested != required {
                tracing::debug!(
                    requested,
                    required,
                    "Requested pass count is advisory; using policy pass count"
                );
            }
        }

        match WipeAction::plan(directive.method, device.class()) {
            WipeAction::Overwrite { patterns } => {
                self.overwrite(target, &patterns, directive, deadline, progress)
            }
            WipeAction::Destroy => self.destroy(target, device, directive, deadline, progress),
        }
    }

    fn validate_target(&self, target: &Path) -> WipeResult<()> {
        if target.as_os_str().is_empty() {
            return Err(WipeError::TargetAccess("target path is empty".to_string()));
        }

        if !self.access.exists(target)? {
            match self.scratch_size {
                Some(size) => self.access.provision(target, size)?,
                None => {
                    return Err(WipeError::TargetNotFound(target.display().to_string()));
                }
            }
        }

        // Surface permission problems before any pass starts
        drop(self.access.open_rw(target)?);
        Ok(())
    }

    fn overwrite(
        &self,
        target: &Path,
        patterns: &[PatternSpec],
        directive: &WipeDirective,
        deadline: &Deadline,
        progress: &mut Progress,
    ) -> WipeResult<()> {
        let total = patterns.len() as u32;
        let mut rng = rand::thread_rng();
        let mut report = OverwriteReport::default();

        let executor = OverwriteExecutor::new(self.access.as_ref())
            .with_flush_interval(self.flush_interval_blocks)
            .with_cancel_flag(&self.cancel)
            .with_deadline(deadline);

        let result = executor.overwrite_into(
            target,
            |pass| {
                Self::log_phase(WipePhase::Overwriting {
                    pass: pass + 1,
                    of: total,
                });
                patterns[pass as usize].resolve(&mut rng)
            },
            total,
            directive.block_size,
            &mut report,
        );

        progress.passes_completed = report.passes_completed;
        progress.bytes_wiped = report.bytes_written;
        result?;

        if directive.verify_after_write {
            Self::log_phase(WipePhase::Verifying);
            let Some(expected) = report.final_pattern() else {
                return Err(WipeError::Verification("no pass was written".to_string()));
            };

            let verification = WipeVerifier::new(self.access.as_ref()).inspect(
                target,
                expected,
                report.extent_size,
            )?;

            progress.verified = Some(verification.passed());
            if let Some(offset) = verification.mismatch_at {
                progress.mismatch = Some(format!(
                    "verification mismatch at offset {}: expected {}",
                    offset, expected
                ));
            }
        }

        Ok(())
    }

    fn destroy(
        &self,
        target: &Path,
        device: &DeviceDescriptor,
        directive: &WipeDirective,
        deadline: &Deadline,
        progress: &mut Progress,
    ) -> WipeResult<()> {
        Self::log_phase(WipePhase::Destroying);
        if self.cancel.is_cancelled() {
            return Err(WipeError::Interrupted);
        }

        let action = DestroyAction::new(
            self.access.as_ref(),
            self.sleeper.as_ref(),
            self.destroy_time_unit,
        );
        let report = action.execute(target, device.declared_capacity(), deadline)?;

        progress.passes_completed = 1;
        progress.bytes_wiped = report.extent_size;

        if directive.verify_after_write {
            Self::log_phase(WipePhase::Verifying);
            let destroyed = WipeVerifier::new(self.access.as_ref()).verify_destroyed(target);
            progress.verified = Some(destroyed);
            if !destroyed {
                progress.mismatch = Some(format!(
                    "{} is still resolvable after destruction",
                    target.display()
                ));
            }
        }

        Ok(())
    }

    fn log_phase(phase: WipePhase) {
        tracing::debug!(phase = %phase, "Wipe phase");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destroy_plans_no_overwrite() {
        for class in DeviceClass::ALL {
            assert_eq!(WipeAction::plan(WipeMethod::Destroy, class), WipeAction::Destroy);
        }
    }

    #[test]
    fn test_purge_plan_on_hdd() {
        assert_eq!(
            WipeAction::plan(WipeMethod::Purge, DeviceClass::HDD),
            WipeAction::Overwrite {
                patterns: vec![
                    PatternSpec::Fixed(0x00),
                    PatternSpec::Fixed(0xFF),
                    PatternSpec::Fixed(0x00)
                ]
            }
        );
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(
            WipePhase::Overwriting { pass: 2, of: 3 }.to_string(),
            "overwriting pass 2/3"
        );
    }
}

// Allow uppercase acronyms for industry-standard terms like HDD, SSD, USB
#![allow(clippy::upper_case_acronyms)]

pub mod algorithms;
pub mod config;
pub mod crypto;
pub mod error;
pub mod io;
pub mod ledger;
pub mod logging;
pub mod pipeline;
pub mod store;
pub mod verification;
pub mod wipe_engine;

// Re-export the two entry points for convenience
pub use pipeline::{BatchRunSummary, PipelineOperation, PipelineOrchestrator, WipeJob};
pub use wipe_engine::WipeEngine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Cooperative cancellation shared between a signal handler and running work.
///
/// Clones observe the same flag. The overwrite loop checks it between blocks
/// and the batch runner checks it around each item.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation (called by the signal handler)
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous request (primarily for testing)
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Errors raised while wiping a single target.
///
/// `PermissionDenied`, `TargetNotFound` and `TargetAccess` together form the
/// target-access class; they stay separate variants so that a permission
/// problem is never reported as a missing file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WipeError {
    #[error("Insufficient permissions: {0}")]
    PermissionDenied(String),

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Target cannot be accessed: {0}")]
    TargetAccess(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("Verification read failed: {0}")]
    Verification(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("Operation interrupted by user")]
    Interrupted,
}

impl WipeError {
    /// Map an error raised while opening or resolving `target`.
    pub fn from_open(err: &std::io::Error, target: &Path) -> Self {
        let what = format!("{}: {}", target.display(), err);
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => WipeError::PermissionDenied(what),
            std::io::ErrorKind::NotFound => WipeError::TargetNotFound(what),
            _ => WipeError::TargetAccess(what),
        }
    }

    /// Wrap a mid-operation read/write/flush failure.
    pub fn io(context: &str, err: &std::io::Error) -> Self {
        WipeError::IoFailure(format!("{}: {}", context, err))
    }

    pub fn kind(&self) -> WipeErrorKind {
        match self {
            WipeError::PermissionDenied(_)
            | WipeError::TargetNotFound(_)
            | WipeError::TargetAccess(_) => WipeErrorKind::TargetAccess,
            WipeError::IoFailure(_) => WipeErrorKind::IoFailure,
            WipeError::Verification(_) => WipeErrorKind::Verification,
            WipeError::InvalidInput(_) => WipeErrorKind::InvalidInput,
            WipeError::Timeout(_) => WipeErrorKind::Timeout,
            WipeError::Interrupted => WipeErrorKind::Interrupted,
        }
    }
}

pub type WipeResult<T> = Result<T, WipeError>;

/// Serializable classification of why a wipe did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WipeErrorKind {
    TargetAccess,
    IoFailure,
    Verification,
    /// Verification ran and the content did not match. Not an I/O error.
    VerificationMismatch,
    InvalidInput,
    Timeout,
    Interrupted,
}

impl fmt::Display for WipeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WipeErrorKind::TargetAccess => "target_access",
            WipeErrorKind::IoFailure => "io_failure",
            WipeErrorKind::Verification => "verification",
            WipeErrorKind::VerificationMismatch => "verification_mismatch",
            WipeErrorKind::InvalidInput => "invalid_input",
            WipeErrorKind::Timeout => "timeout",
            WipeErrorKind::Interrupted => "interrupted",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    HDD,
    SSD,
    USB,
    NVMe,
    SDCard,
    Other,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 6] = [
        DeviceClass::HDD,
        DeviceClass::SSD,
        DeviceClass::USB,
        DeviceClass::NVMe,
        DeviceClass::SDCard,
        DeviceClass::Other,
    ];

    /// Flash media whose purge is a single randomized pass.
    pub fn is_flash(&self) -> bool {
        matches!(self, DeviceClass::SSD | DeviceClass::NVMe)
    }

    /// Best-effort guess from a path string. Never authoritative.
    pub fn infer_from_path(path: &str) -> Self {
        let lowered = path.to_ascii_lowercase();

        if lowered.contains("nvme") {
            DeviceClass::NVMe
        } else if lowered.contains("ssd") {
            DeviceClass::SSD
        } else if lowered.contains("usb") {
            DeviceClass::USB
        } else if lowered.contains("mmc") || lowered.contains("sdcard") || lowered.contains("sd_card") {
            DeviceClass::SDCard
        } else if lowered.contains("hdd") || lowered.contains("/dev/sd") || lowered.contains("/dev/hd") {
            DeviceClass::HDD
        } else {
            DeviceClass::Other
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeviceClass::HDD => "HDD",
            DeviceClass::SSD => "SSD",
            DeviceClass::USB => "USB",
            DeviceClass::NVMe => "NVMe",
            DeviceClass::SDCard => "SDCard",
            DeviceClass::Other => "Other",
        };
        f.write_str(label)
    }
}

impl FromStr for DeviceClass {
    type Err = WipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hdd" => Ok(DeviceClass::HDD),
            "ssd" => Ok(DeviceClass::SSD),
            "usb" => Ok(DeviceClass::USB),
            "nvme" => Ok(DeviceClass::NVMe),
            "sdcard" | "sd_card" | "sd" => Ok(DeviceClass::SDCard),
            "other" => Ok(DeviceClass::Other),
            other => Err(WipeError::InvalidInput(format!(
                "unknown device class '{}'",
                other
            ))),
        }
    }
}

/// Compliance tier requested for a wipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WipeMethod {
    Clear,
    Purge,
    Destroy,
}

impl WipeMethod {
    pub const ALL: [WipeMethod; 3] = [WipeMethod::Clear, WipeMethod::Purge, WipeMethod::Destroy];
}

impl fmt::Display for WipeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WipeMethod::Clear => "CLEAR",
            WipeMethod::Purge => "PURGE",
            WipeMethod::Destroy => "DESTROY",
        };
        f.write_str(label)
    }
}

impl FromStr for WipeMethod {
    type Err = WipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clear" => Ok(WipeMethod::Clear),
            "purge" => Ok(WipeMethod::Purge),
            "destroy" => Ok(WipeMethod::Destroy),
            other => Err(WipeError::InvalidInput(format!(
                "unknown wipe method '{}'",
                other
            ))),
        }
    }
}

/// Identity and class of the thing being wiped. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    id: String,
    class: DeviceClass,
    declared_capacity: Option<u64>,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, class: DeviceClass) -> WipeResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(WipeError::InvalidInput(
                "device id must not be empty".to_string(),
            ));
        }

        Ok(Self {
            id,
            class,
            declared_capacity: None,
        })
    }

    pub fn with_declared_capacity(mut self, bytes: u64) -> Self {
        self.declared_capacity = Some(bytes);
        self
    }

    /// Derive a descriptor from a target path: a stable id from the path hash,
    /// a class from naming heuristics and the capacity from file metadata.
    pub fn from_path(path: &Path) -> Self {
        let raw = path.to_string_lossy();
        let hash = format!("{:x}", Sha256::digest(raw.as_bytes()));

        Self {
            id: format!("DEV-{}", hash[..8].to_ascii_uppercase()),
            class: DeviceClass::infer_from_path(&raw),
            declared_capacity: std::fs::metadata(path).ok().map(|m| m.len()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn declared_capacity(&self) -> Option<u64> {
        self.declared_capacity
    }
}

/// Requested wipe policy.
///
/// `requested_passes` is advisory only. The pass count always comes from
/// [`algorithms::PatternPolicy`] and cannot be overridden by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WipeDirective {
    pub method: WipeMethod,
    pub requested_passes: Option<u32>,
    pub verify_after_write: bool,
    pub block_size: usize,
    pub timeout: Duration,
}

pub const DEFAULT_BLOCK_SIZE: usize = 4096;
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(3600);

impl Default for WipeDirective {
    fn default() -> Self {
        Self {
            method: WipeMethod::Clear,
            requested_passes: None,
            verify_after_write: true,
            block_size: DEFAULT_BLOCK_SIZE,
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl WipeDirective {
    pub fn new(method: WipeMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify_after_write = verify;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_requested_passes(mut self, passes: u32) -> Self {
        self.requested_passes = Some(passes);
        self
    }

    pub fn validate(&self) -> WipeResult<()> {
        if self.block_size == 0 {
            return Err(WipeError::InvalidInput(
                "block size must be positive".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(WipeError::InvalidInput(
                "timeout must be positive".to_string(),
            ));
        }
        if self.requested_passes == Some(0) {
            return Err(WipeError::InvalidInput(
                "requested passes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of one wipe attempt. Produced once by the engine and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WipeOutcome {
    pub operation_id: String,
    pub device_id: String,
    pub method: WipeMethod,
    pub operator_id: String,
    pub passes_completed: u32,
    pub bytes_wiped: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub success: bool,
    /// `None` when verification was not requested
    pub verified: Option<bool>,
    pub verification_digest: Option<String>,
    pub error_reason: Option<String>,
    pub error_kind: Option<WipeErrorKind>,
}

impl WipeOutcome {
    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }

    pub fn is_target_access_failure(&self) -> bool {
        self.error_kind == Some(WipeErrorKind::TargetAccess)
    }
}

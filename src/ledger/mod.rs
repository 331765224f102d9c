//! Append-only audit record for completed wipes
//!
//! The pipeline only depends on the [`Ledger`] trait. [`LocalLedger`] is the
//! bundled implementation: a hash-chained log kept in memory or in a
//! JSON-lines file, reachable only through a local endpoint.

pub mod endpoint;
pub mod local;

pub use endpoint::{LedgerEndpoint, TRUSTED_HOSTS};
pub use local::{ChainError, LedgerEntry, LocalLedger, GENESIS_HASH};

use crate::error::CollaboratorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle returned by a ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerReference(String);

impl LedgerReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedgerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a ledger lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub reference: LedgerReference,
    pub device_id: String,
    pub digest: String,
    pub recorded_at: DateTime<Utc>,
    /// Entries at or after this one
    pub confirmations: u64,
    pub block_ref: u64,
    pub cost_units: u64,
}

#[cfg_attr(test, mockall::automock)]
pub trait Ledger: Send + Sync {
    /// Append a digest for `device_id`. This is the call wrapped by retry.
    fn record(&self, device_id: &str, digest: &str) -> Result<LedgerReference, CollaboratorError>;

    fn get_record(&self, reference: &LedgerReference) -> Result<LedgerRecord, CollaboratorError>;
}

/// Error handling shared by the pipeline's external calls
///
/// This module provides:
/// - Error classification (which failures are worth retrying)
/// - The error type returned by every external collaborator
/// - Bounded retry with exponential backoff and an injectable sleeper
/// - Overall operation deadlines
///
/// # Architecture
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │        Pipeline Orchestrator         │
/// └──────────────────┬───────────────────┘
///                    │ external call
///                    ↓
/// ┌──────────────────────────────────────┐
/// │  RetryPolicy  (attempts, backoff)    │──→ Sleeper
/// └──────────────────┬───────────────────┘
///                    │ bounded by
///                    ↓
/// ┌──────────────────────────────────────┐
/// │  Deadline  (directive timeout)       │
/// └──────────────────────────────────────┘
/// ```
///
/// # Usage Example
///
/// ```rust,ignore
/// use wipe_ledger::error::{Deadline, RetryPolicy};
///
/// let policy = RetryPolicy::default();
/// let deadline = Deadline::after(directive.timeout);
/// let reference = policy.execute(&deadline, |_state| ledger.record(&device_id, &digest))?;
/// ```
pub mod classification;
pub mod deadline;
pub mod retry;

pub use classification::{Classify, ErrorClass};
pub use deadline::Deadline;
pub use retry::{RetryError, RetryPolicy, RetryState, Sleeper, ThreadSleeper};

use thiserror::Error;

/// Failure reported by an external collaborator (hasher, ledger, issuer, store).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Malformed input; retrying cannot help
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("untrusted endpoint: {0}")]
    UntrustedEndpoint(String),

    #[error("ledger reference is required but absent")]
    MissingLedgerReference,

    /// Service temporarily unreachable
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),
}

impl Classify for CollaboratorError {
    fn class(&self) -> ErrorClass {
        match self {
            CollaboratorError::InvalidInput(_)
            | CollaboratorError::UntrustedEndpoint(_)
            | CollaboratorError::MissingLedgerReference => ErrorClass::Fatal,
            CollaboratorError::Unavailable(_) | CollaboratorError::Failed(_) => {
                ErrorClass::Transient
            }
        }
    }
}

impl From<rusqlite::Error> for CollaboratorError {
    fn from(err: rusqlite::Error) -> Self {
        CollaboratorError::Failed(format!("database error: {}", err))
    }
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(err: serde_json::Error) -> Self {
        CollaboratorError::InvalidInput(format!("serialization failed: {}", err))
    }
}

impl From<std::io::Error> for CollaboratorError {
    fn from(err: std::io::Error) -> Self {
        CollaboratorError::Unavailable(format!("I/O error: {}", err))
    }
}

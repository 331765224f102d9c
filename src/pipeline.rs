//! Pipeline Orchestrator - chains wipe, hash, ledger, certificate and persist
//!
//! One operation at a time, strictly in order. A failed wipe never reaches the
//! hash stage, and a certificate is never requested without a ledger
//! reference. Every external call runs on a worker thread so the directive's
//! timeout can abandon it; the ledger write is additionally retried with
//! exponential backoff.

pub mod batch;
pub mod operation;
pub mod stats;


pub use batch::{BatchRunSummary, BatchStatus};
pub use operation::{PipelineOperation, PipelineStage, PipelineState, StageFailure};
pub use stats::PipelineStats;

use crate::crypto::{CertificateHandle, CertificateIssuer, HashGenerator};
use crate::error::{Classify, CollaboratorError, Deadline, ErrorClass, RetryError, RetryPolicy};
use crate::ledger::{Ledger, LedgerReference};
use crate::store::PersistenceStore;
use crate::wipe_engine::WipeEngine;
use crate::{CancelFlag, DeviceDescriptor, WipeDirective, WipeErrorKind, WipeOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Time allowed for the best-effort save once the operation deadline passed
const PERSIST_GRACE: Duration = Duration::from_secs(5);

/// One unit of work: what to wipe, what it is, and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WipeJob {
    pub target: PathBuf,
    pub device: DeviceDescriptor,
    pub directive: WipeDirective,
}

impl WipeJob {
    pub fn new(target: impl Into<PathBuf>, device: DeviceDescriptor, directive: WipeDirective) -> Self {
        Self {
            target: target.into(),
            device,
            directive,
        }
    }
}

/// Why a stage halted the pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("wipe failed ({kind}): {reason}")]
    Wipe { kind: WipeErrorKind, reason: String },

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: CollaboratorError,
    },

    #[error("{stage} stage gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        stage: PipelineStage,
        attempts: u32,
        last: CollaboratorError,
    },

    #[error("{stage} stage exceeded the operation timeout")]
    Timeout { stage: PipelineStage },
}

impl PipelineError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::Wipe { .. } => PipelineStage::Wipe,
            PipelineError::Stage { stage, .. }
            | PipelineError::RetryExhausted { stage, .. }
            | PipelineError::Timeout { stage } => *stage,
        }
    }
}

/// Unexpected fault (a collaborator panicked). The operation was already
/// marked failed and handed to the store before this was returned.
#[derive(Error, Debug)]
#[error("unexpected fault in {stage} stage of operation {}: {message}", .operation.operation_id)]
pub struct PipelineFault {
    pub stage: PipelineStage,
    pub message: String,
    pub operation: Box<PipelineOperation>,
}

/// Failure of a single threaded external call
#[derive(Debug)]
enum CallError {
    Collaborator(CollaboratorError),
    TimedOut,
    Panicked,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Collaborator(e) => write!(f, "{}", e),
            CallError::TimedOut => write!(f, "call abandoned at deadline"),
            CallError::Panicked => write!(f, "collaborator panicked"),
        }
    }
}

impl Classify for CallError {
    fn class(&self) -> ErrorClass {
        match self {
            CallError::Collaborator(e) => e.class(),
            CallError::TimedOut | CallError::Panicked => ErrorClass::Fatal,
        }
    }
}

/// Why `run_one` stopped early
enum Halt {
    Error(PipelineError),
    Fault { stage: PipelineStage, message: String },
}

impl Halt {
    fn from_call(stage: PipelineStage, error: CallError) -> Self {
        match error {
            CallError::Collaborator(source) => Halt::Error(PipelineError::Stage { stage, source }),
            CallError::TimedOut => Halt::Error(PipelineError::Timeout { stage }),
            CallError::Panicked => Halt::Fault {
                stage,
                message: "collaborator panicked".to_string(),
            },
        }
    }

    fn from_retry(stage: PipelineStage, error: RetryError<CallError>) -> Self {
        match error {
            RetryError::Exhausted {
                attempts,
                last: CallError::Collaborator(last),
            } => Halt::Error(PipelineError::RetryExhausted {
                stage,
                attempts,
                last,
            }),
            RetryError::Exhausted { last, .. } => Self::from_call(stage, last),
            RetryError::NonRetriable { error, .. } => Self::from_call(stage, error),
            RetryError::TimedOut { .. } => Halt::Error(PipelineError::Timeout { stage }),
        }
    }
}

/// Run `call` on a worker thread, giving up on it when `deadline` passes.
///
/// An abandoned call keeps running detached; its result is dropped.
fn call_with_deadline<T, F>(deadline: &Deadline, call: F) -> Result<T, CallError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CollaboratorError> + Send + 'static,
{
    if deadline.is_expired() {
        return Err(CallError::TimedOut);
    }

    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name("pipeline-call".to_string())
        .spawn(move || {
            // Receiver may be gone after a timeout
            let _ = tx.send(call());
        })
        .map_err(|e| {
            CallError::Collaborator(CollaboratorError::Unavailable(format!(
                "could not spawn worker: {}",
                e
            )))
        })?;

    let received = match deadline.remaining() {
        Some(remaining) => rx.recv_timeout(remaining),
        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
    };

    match received {
        Ok(result) => result.map_err(CallError::Collaborator),
        Err(RecvTimeoutError::Timeout) => Err(CallError::TimedOut),
        Err(RecvTimeoutError::Disconnected) => Err(CallError::Panicked),
    }
}

pub struct PipelineOrchestrator {
    engine: WipeEngine,
    hasher: Arc<dyn HashGenerator>,
    ledger: Arc<dyn Ledger>,
    issuer: Arc<dyn CertificateIssuer>,
    store: Arc<dyn PersistenceStore>,
    retry: RetryPolicy,
    stats: PipelineStats,
}

impl PipelineOrchestrator {
    pub fn new(
        engine: WipeEngine,
        hasher: Arc<dyn HashGenerator>,
        ledger: Arc<dyn Ledger>,
        issuer: Arc<dyn CertificateIssuer>,
        store: Arc<dyn PersistenceStore>,
    ) -> Self {
        Self {
            engine,
            hasher,
            ledger,
            issuer,
            store,
            retry: RetryPolicy::default(),
            stats: PipelineStats::default(),
        }
    }

    /// Policy for the ledger write (default 3 attempts, 1s base delay)
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Shared with the wipe engine; checked between blocks and between batch items
    pub fn cancel_flag(&self) -> &CancelFlag {
        self.engine.cancel_flag()
    }

    pub fn engine(&self) -> &WipeEngine {
        &self.engine
    }

    /// Drive one job to a terminal state.
    ///
    /// Expected failures come back as `Ok` with `state == Failed` and the
    /// halting stage recorded. `Err` is reserved for unexpected faults.
    pub fn run_one(&mut self, job: &WipeJob) -> Result<PipelineOperation, PipelineFault> {
        let mut operation =
            PipelineOperation::new(job.target.clone(), job.device.clone(), job.directive.clone());
        let deadline = Deadline::after(job.directive.timeout);

        let span = tracing::info_span!(
            "pipeline",
            operation_id = %operation.operation_id,
            device_id = %job.device.id()
        );
        let _enter = span.enter();

        match self.execute_stages(&mut operation, job, &deadline) {
            Ok(()) => {
                self.persist(&mut operation, &deadline);
                self.finish(&operation);
                tracing::info!(
                    state = %operation.state,
                    content_hash = operation.content_hash.as_deref().unwrap_or_default(),
                    "Operation completed"
                );
                Ok(operation)
            }
            Err(Halt::Error(error)) => {
                let stage = error.stage();
                tracing::warn!(stage = %stage, error = %error, "Pipeline halted");
                operation.fail(stage, error.to_string());
                self.persist(&mut operation, &deadline);
                self.finish(&operation);
                Ok(operation)
            }
            Err(Halt::Fault { stage, message }) => {
                tracing::error!(stage = %stage, message = %message, "Unexpected pipeline fault");
                operation.fail(stage, message.clone());
                self.persist(&mut operation, &deadline);
                self.finish(&operation);
                Err(PipelineFault {
                    stage,
                    message,
                    operation: Box::new(operation),
                })
            }
        }
    }

    /// Run jobs in order, one complete `run_one` at a time.
    pub fn run_batch(&mut self, jobs: &[WipeJob], continue_on_error: bool) -> BatchRunSummary {
        let mut summary = BatchRunSummary::new(jobs.len());

        for (index, job) in jobs.iter().enumerate() {
            if self.cancel_flag().is_cancelled() {
                tracing::warn!(
                    processed = summary.processed(),
                    remaining = jobs.len() - index,
                    "Batch cancelled"
                );
                return summary.finish(BatchStatus::Cancelled);
            }

            let operation = match self.run_one(job) {
                Ok(operation) => operation,
                Err(fault) => *fault.operation,
            };
            let succeeded = operation.is_success();
            summary.push(operation);

            // A cancel that lands mid-item leaves that item interrupted
            if self.cancel_flag().is_cancelled() {
                tracing::warn!(
                    processed = summary.processed(),
                    remaining = jobs.len() - index - 1,
                    "Batch cancelled"
                );
                return summary.finish(BatchStatus::Cancelled);
            }

            if !succeeded && !continue_on_error && index + 1 < jobs.len() {
                tracing::warn!(
                    processed = summary.processed(),
                    skipped = jobs.len() - index - 1,
                    "Stopping batch after failure"
                );
                return summary.finish(BatchStatus::StoppedOnError);
            }
        }

        summary.finish(BatchStatus::Completed)
    }

    fn execute_stages(
        &self,
        operation: &mut PipelineOperation,
        job: &WipeJob,
        deadline: &Deadline,
    ) -> Result<(), Halt> {
        // Init -> Wiped
        let outcome = self.engine.wipe_operation(
            &operation.operation_id,
            &job.target,
            &job.device,
            &job.directive,
            deadline,
        );
        if !outcome.success {
            let error = PipelineError::Wipe {
                kind: outcome.error_kind.unwrap_or(WipeErrorKind::IoFailure),
                reason: outcome.error_reason.clone().unwrap_or_default(),
            };
            operation.wipe_outcome = Some(outcome);
            return Err(Halt::Error(error));
        }
        operation.wipe_outcome = Some(outcome.clone());
        operation.advance(PipelineState::Wiped);

        // Wiped -> Hashed
        let hasher = Arc::clone(&self.hasher);
        let hashed_outcome = outcome.clone();
        let digest = call_with_deadline(deadline, move || hasher.hash(&hashed_outcome))
            .map_err(|e| Halt::from_call(PipelineStage::Hash, e))?;
        operation.content_hash = Some(digest.clone());
        operation.advance(PipelineState::Hashed);

        // Hashed -> Recorded
        let reference = self.record_with_retry(job.device.id(), &digest, deadline)?;
        operation.ledger_reference = Some(reference.clone());
        operation.advance(PipelineState::Recorded);

        // Recorded -> Certified
        let certificate = self.issue_certificate(outcome, digest, reference, job.device.clone(), deadline)?;
        operation.certificate = Some(certificate);
        operation.advance(PipelineState::Certified);

        Ok(())
    }

    fn record_with_retry(
        &self,
        device_id: &str,
        digest: &str,
        deadline: &Deadline,
    ) -> Result<LedgerReference, Halt> {
        self.retry
            .execute(deadline, |state| {
                tracing::debug!(
                    stage = %PipelineStage::Ledger,
                    attempt = state.attempt + 1,
                    "Writing ledger record"
                );
                let ledger = Arc::clone(&self.ledger);
                let device_id = device_id.to_string();
                let digest = digest.to_string();
                call_with_deadline(deadline, move || ledger.record(&device_id, &digest))
            })
            .map_err(|e| Halt::from_retry(PipelineStage::Ledger, e))
    }

    fn issue_certificate(
        &self,
        outcome: WipeOutcome,
        digest: String,
        reference: LedgerReference,
        device: DeviceDescriptor,
        deadline: &Deadline,
    ) -> Result<CertificateHandle, Halt> {
        let issuer = Arc::clone(&self.issuer);
        call_with_deadline(deadline, move || {
            issuer.issue(&outcome, &digest, Some(reference), &device)
        })
        .map_err(|e| Halt::from_call(PipelineStage::Certificate, e))
    }

    /// Best-effort save. A success is stored as `Persisted` and stays
    /// `Certified` in memory if the save fails.
    fn persist(&self, operation: &mut PipelineOperation, deadline: &Deadline) {
        let promote = operation.state == PipelineState::Certified;
        let mut snapshot = operation.clone();
        if promote {
            snapshot.advance(PipelineState::Persisted);
        } else {
            snapshot.touch();
        }

        // Failed operations still get saved after the deadline passed
        let save_deadline = if deadline.is_expired() {
            Deadline::after(PERSIST_GRACE)
        } else {
            *deadline
        };

        let store = Arc::clone(&self.store);
        let saved = snapshot.clone();
        match call_with_deadline(&save_deadline, move || store.save(&saved)) {
            Ok(()) => *operation = snapshot,
            Err(error) => {
                tracing::warn!(
                    stage = %PipelineStage::Persist,
                    operation_id = %operation.operation_id,
                    error = %error,
                    "Could not persist operation"
                );
            }
        }
    }

    fn finish(&mut self, operation: &PipelineOperation) {
        self.stats
            .record_terminal(operation.is_success(), operation.last_updated);
    }
}

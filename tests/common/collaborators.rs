/// Scripted collaborators for driving the pipeline through failure paths

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use wipe_ledger::error::{CollaboratorError, Sleeper};
use wipe_ledger::ledger::{Ledger, LedgerRecord, LedgerReference, LocalLedger};
use wipe_ledger::store::PersistenceStore;
use wipe_ledger::PipelineOperation;

/// Records requested waits instead of sleeping
#[derive(Default)]
pub struct RecordingSleeper(Mutex<Vec<Duration>>);

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.0.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.0.lock().unwrap().push(duration);
    }
}

/// In-memory ledger whose first `failures` writes report `Unavailable`
pub struct FlakyLedger {
    inner: LocalLedger,
    failures_remaining: AtomicU32,
    attempts: AtomicU32,
}

impl FlakyLedger {
    pub fn failing(failures: u32) -> Self {
        Self {
            inner: LocalLedger::in_memory(),
            failures_remaining: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> usize {
        self.inner.len()
    }

    pub fn inner(&self) -> &LocalLedger {
        &self.inner
    }
}

impl Ledger for FlakyLedger {
    fn record(&self, device_id: &str, digest: &str) -> Result<LedgerReference, CollaboratorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(CollaboratorError::Unavailable("ledger node unreachable".to_string()));
        }

        self.inner.record(device_id, digest)
    }

    fn get_record(&self, reference: &LedgerReference) -> Result<LedgerRecord, CollaboratorError> {
        self.inner.get_record(reference)
    }
}

/// Store that refuses every save
#[derive(Default)]
pub struct FailingStore {
    attempts: AtomicU32,
}

impl FailingStore {
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl PersistenceStore for FailingStore {
    fn save(&self, _operation: &PipelineOperation) -> Result<(), CollaboratorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CollaboratorError::Unavailable("disk full".to_string()))
    }
}

/// Store that keeps every saved snapshot in memory
#[derive(Default)]
pub struct MemoryStore(Mutex<Vec<PipelineOperation>>);

impl MemoryStore {
    pub fn saved(&self) -> Vec<PipelineOperation> {
        self.0.lock().unwrap().clone()
    }
}

impl PersistenceStore for MemoryStore {
    fn save(&self, operation: &PipelineOperation) -> Result<(), CollaboratorError> {
        self.0.lock().unwrap().push(operation.clone());
        Ok(())
    }
}

use super::operation::PipelineOperation;
use serde::Serialize;
use std::fmt;

/// How a batch run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every input was attempted
    Completed,
    /// Halted after a failure with `continue_on_error == false`
    StoppedOnError,
    /// Cancelled before the input was exhausted
    Cancelled,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BatchStatus::Completed => "completed",
            BatchStatus::StoppedOnError => "stopped on error",
            BatchStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Read-only result of a batch run.
///
/// `processed == successful + failed` and `processed <= requested` always
/// hold. Items never attempted are absent from `operations`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRunSummary {
    requested: usize,
    processed: usize,
    successful: usize,
    failed: usize,
    status: BatchStatus,
    operations: Vec<PipelineOperation>,
}

impl BatchRunSummary {
    pub(crate) fn new(requested: usize) -> Self {
        Self {
            requested,
            processed: 0,
            successful: 0,
            failed: 0,
            status: BatchStatus::Completed,
            operations: Vec::with_capacity(requested),
        }
    }

    pub(crate) fn push(&mut self, operation: PipelineOperation) {
        self.processed += 1;
        if operation.is_success() {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.operations.push(operation);
    }

    pub(crate) fn finish(mut self, status: BatchStatus) -> Self {
        self.status = status;
        self
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn successful(&self) -> usize {
        self.successful
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    /// Per-item results in input order
    pub fn operations(&self) -> &[PipelineOperation] {
        &self.operations
    }

    /// True when some inputs were never attempted or the run was cancelled
    pub fn is_partial(&self) -> bool {
        self.processed < self.requested || self.status == BatchStatus::Cancelled
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rolling counters owned by one orchestrator.
///
/// Updated only when an operation reaches a terminal state, so a reader never
/// observes a half-applied run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    processed_count: u64,
    success_count: u64,
    failure_count: u64,
    last_operation_timestamp: Option<DateTime<Utc>>,
}

impl PipelineStats {
    pub fn processed_count(&self) -> u64 {
        self.processed_count
    }

    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    pub fn last_operation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_operation_timestamp
    }

    /// Fraction of processed operations that succeeded, 0.0 when none ran
    pub fn success_rate(&self) -> f64 {
        if self.processed_count == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.processed_count as f64
    }

    pub(crate) fn record_terminal(&mut self, success: bool, at: DateTime<Utc>) {
        self.processed_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.last_operation_timestamp = Some(at);
    }
}

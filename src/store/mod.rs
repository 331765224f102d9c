//! Local persistence of pipeline operations
//!
//! Saving is best-effort from the pipeline's point of view: a failing store
//! is logged and never changes an operation's outcome.

pub mod sqlite;

pub use sqlite::{OperationSummary, SqliteOperationStore};

use crate::error::CollaboratorError;
use crate::pipeline::PipelineOperation;

#[cfg_attr(test, mockall::automock)]
pub trait PersistenceStore: Send + Sync {
    fn save(&self, operation: &PipelineOperation) -> Result<(), CollaboratorError>;
}

use crate::crypto::CertificateHandle;
use crate::ledger::LedgerReference;
use crate::{DeviceDescriptor, WipeDirective, WipeOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Position of an operation in the pipeline.
///
/// `Init → Wiped → Hashed → Recorded → Certified → Persisted`, or `Failed`
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    Wiped,
    Hashed,
    Recorded,
    Certified,
    Persisted,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Persisted | PipelineState::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            PipelineState::Init => 0,
            PipelineState::Wiped => 1,
            PipelineState::Hashed => 2,
            PipelineState::Recorded => 3,
            PipelineState::Certified => 4,
            PipelineState::Persisted => 5,
            PipelineState::Failed => u8::MAX,
        }
    }

    /// Forward by exactly one step, or to `Failed` from a non-terminal state.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == PipelineState::Failed || next.rank() == self.rank() + 1
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Init => "init",
            PipelineState::Wiped => "wiped",
            PipelineState::Hashed => "hashed",
            PipelineState::Recorded => "recorded",
            PipelineState::Certified => "certified",
            PipelineState::Persisted => "persisted",
            PipelineState::Failed => "failed",
        };
        f.write_str(label)
    }
}

impl FromStr for PipelineState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(PipelineState::Init),
            "wiped" => Ok(PipelineState::Wiped),
            "hashed" => Ok(PipelineState::Hashed),
            "recorded" => Ok(PipelineState::Recorded),
            "certified" => Ok(PipelineState::Certified),
            "persisted" => Ok(PipelineState::Persisted),
            "failed" => Ok(PipelineState::Failed),
            other => Err(format!("unknown pipeline state '{}'", other)),
        }
    }
}

/// Step of the pipeline a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Wipe,
    Hash,
    Ledger,
    Certificate,
    Persist,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineStage::Wipe => "wipe",
            PipelineStage::Hash => "hash",
            PipelineStage::Ledger => "ledger",
            PipelineStage::Certificate => "certificate",
            PipelineStage::Persist => "persist",
        };
        f.write_str(label)
    }
}

/// Terminal failure: the stage that halted the pipeline and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: PipelineStage,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// One end-to-end run, filled in strictly in pipeline order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOperation {
    pub operation_id: String,
    pub target: PathBuf,
    pub device: DeviceDescriptor,
    pub directive: WipeDirective,
    pub state: PipelineState,
    pub wipe_outcome: Option<WipeOutcome>,
    pub content_hash: Option<String>,
    pub ledger_reference: Option<LedgerReference>,
    pub certificate: Option<CertificateHandle>,
    pub failure: Option<StageFailure>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl PipelineOperation {
    pub fn new(target: impl Into<PathBuf>, device: DeviceDescriptor, directive: WipeDirective) -> Self {
        let now = Utc::now();
        Self {
            operation_id: Uuid::new_v4().to_string(),
            target: target.into(),
            device,
            directive,
            state: PipelineState::Init,
            wipe_outcome: None,
            content_hash: None,
            ledger_reference: None,
            certificate: None,
            failure: None,
            created_at: now,
            last_updated: now,
        }
    }

    /// Reached `Certified`: every audit side effect happened.
    /// Persistence is best-effort and does not change this.
    pub fn is_success(&self) -> bool {
        matches!(self.state, PipelineState::Certified | PipelineState::Persisted)
    }

    pub fn failure_stage(&self) -> Option<PipelineStage> {
        self.failure.as_ref().map(|f| f.stage)
    }

    pub(crate) fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
        self.touch();
    }

    pub(crate) fn fail(&mut self, stage: PipelineStage, reason: impl Into<String>) {
        let now = Utc::now();
        self.failure = Some(StageFailure {
            stage,
            reason: reason.into(),
            failed_at: now,
        });
        self.state = PipelineState::Failed;
        self.last_updated = now;
    }

    pub(crate) fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

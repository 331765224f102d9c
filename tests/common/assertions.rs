/// Assertion helpers for wiped targets and finished operations

use anyhow::Result;
use std::path::Path;
use wipe_ledger::pipeline::{PipelineStage, PipelineState};
use wipe_ledger::PipelineOperation;

/// Assert every byte of `path` equals `expected`
pub fn assert_filled_with(path: &Path, expected: u8) -> Result<()> {
    let data = std::fs::read(path)?;
    if let Some(offset) = data.iter().position(|&b| b != expected) {
        anyhow::bail!(
            "{} holds 0x{:02X} at offset {}, expected 0x{:02X} throughout",
            path.display(),
            data[offset],
            offset,
            expected
        );
    }
    Ok(())
}

/// Assert `path` holds a single repeated byte and return it
pub fn assert_uniform(path: &Path) -> Result<u8> {
    let data = std::fs::read(path)?;
    let first = *data.first().ok_or_else(|| anyhow::anyhow!("{} is empty", path.display()))?;
    assert_filled_with(path, first)?;
    Ok(first)
}

/// Assert a successful run carries every attestation artifact
pub fn assert_fully_attested(operation: &PipelineOperation) -> Result<()> {
    anyhow::ensure!(
        operation.is_success(),
        "operation ended in {} ({:?})",
        operation.state,
        operation.failure
    );
    let outcome = operation
        .wipe_outcome
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("no wipe outcome recorded"))?;
    anyhow::ensure!(outcome.success, "wipe outcome is not successful");
    anyhow::ensure!(
        operation.content_hash.as_deref().map_or(false, |h| h.len() == 64),
        "content hash missing or malformed"
    );
    anyhow::ensure!(operation.ledger_reference.is_some(), "ledger reference missing");
    anyhow::ensure!(operation.certificate.is_some(), "certificate missing");
    Ok(())
}

/// Assert the run halted at `stage` and produced nothing after it
pub fn assert_halted_at(operation: &PipelineOperation, stage: PipelineStage) -> Result<()> {
    anyhow::ensure!(
        operation.state == PipelineState::Failed,
        "expected failure, got {}",
        operation.state
    );
    anyhow::ensure!(
        operation.failure_stage() == Some(stage),
        "expected halt at {}, got {:?}",
        stage,
        operation.failure_stage()
    );
    if matches!(stage, PipelineStage::Wipe | PipelineStage::Hash | PipelineStage::Ledger) {
        anyhow::ensure!(operation.certificate.is_none(), "certificate issued after halt");
    }
    Ok(())
}

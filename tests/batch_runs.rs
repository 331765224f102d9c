/// Batch processing integration tests
///
/// Tests cover ordering, stop-on-error, continue-on-error, cancellation and
/// the processing summary exposed by the orchestrator.
use std::sync::Arc;
use tempfile::TempDir;
use wipe_ledger::io::FileDeviceAccess;
use wipe_ledger::pipeline::{BatchStatus, PipelineStage};
use wipe_ledger::*;

#[path = "common/mod.rs"]
mod common;

use common::assertions::{assert_filled_with, assert_halted_at};
use common::collaborators::{FlakyLedger, MemoryStore, RecordingSleeper};
use common::targets::filled_target;

struct Fixture {
    _dir: TempDir,
    jobs: Vec<WipeJob>,
    ledger: Arc<FlakyLedger>,
    store: Arc<MemoryStore>,
}

/// One job per entry; `false` entries point at a target that does not exist.
fn fixture(present: &[bool]) -> Fixture {
    let dir = TempDir::new().unwrap();
    let jobs = present
        .iter()
        .enumerate()
        .map(|(i, &exists)| {
            let name = format!("disk-{}.img", i);
            let target = if exists {
                filled_target(&dir, &name, 2048, 0xA5)
            } else {
                dir.path().join(name)
            };
            let device = DeviceDescriptor::new(format!("DEV-{}", i), DeviceClass::HDD).unwrap();
            WipeJob::new(target, device, WipeDirective::new(WipeMethod::Clear))
        })
        .collect();

    Fixture {
        _dir: dir,
        jobs,
        ledger: Arc::new(FlakyLedger::failing(0)),
        store: Arc::new(MemoryStore::default()),
    }
}

fn pipeline(fixture: &Fixture) -> PipelineOrchestrator {
    common::pipeline_with(
        Arc::new(FileDeviceAccess::new()),
        fixture.ledger.clone(),
        fixture.store.clone(),
        Arc::new(RecordingSleeper::default()),
    )
}

#[test]
fn test_all_targets_processed_in_order() {
    let fixture = fixture(&[true, true, true]);
    let mut pipeline = pipeline(&fixture);

    let summary = pipeline.run_batch(&fixture.jobs, false);

    assert_eq!(summary.status(), BatchStatus::Completed);
    assert_eq!(summary.processed(), 3);
    assert_eq!(summary.successful(), 3);
    assert!(!summary.is_partial());

    let devices: Vec<_> = summary.operations().iter().map(|op| op.device.id()).collect();
    assert_eq!(devices, vec!["DEV-0", "DEV-1", "DEV-2"]);
    for job in &fixture.jobs {
        assert_filled_with(&job.target, 0x00).unwrap();
    }
    assert_eq!(fixture.ledger.recorded(), 3);
    assert_eq!(fixture.store.saved().len(), 3);
}

#[test]
fn test_stop_on_error_leaves_later_targets_untouched() {
    let fixture = fixture(&[true, false, true]);
    let mut pipeline = pipeline(&fixture);

    let summary = pipeline.run_batch(&fixture.jobs, false);

    assert_eq!(summary.status(), BatchStatus::StoppedOnError);
    assert_eq!(summary.processed(), 2);
    assert_eq!(summary.failed(), 1);
    assert!(summary.is_partial());
    assert_halted_at(&summary.operations()[1], PipelineStage::Wipe).unwrap();

    // Third target was never attempted
    assert_filled_with(&fixture.jobs[2].target, 0xA5).unwrap();
    assert_eq!(fixture.ledger.recorded(), 1);
}

#[test]
fn test_continue_on_error_processes_everything() {
    let fixture = fixture(&[false, true, false, true]);
    let mut pipeline = pipeline(&fixture);

    let summary = pipeline.run_batch(&fixture.jobs, true);

    assert_eq!(summary.status(), BatchStatus::Completed);
    assert_eq!(summary.processed(), 4);
    assert_eq!(summary.successful(), 2);
    assert_eq!(summary.failed(), 2);
    assert_eq!(summary.processed(), summary.successful() + summary.failed());

    let stats = pipeline.stats();
    assert_eq!(stats.processed_count(), 4);
    assert_eq!(stats.failure_count(), 2);
    assert!((stats.success_rate() - 0.5).abs() < f64::EPSILON);
    assert!(stats.last_operation_timestamp().is_some());
}

#[test]
fn test_failure_on_last_item_still_completes() {
    let fixture = fixture(&[true, false]);
    let mut pipeline = pipeline(&fixture);

    let summary = pipeline.run_batch(&fixture.jobs, false);

    assert_eq!(summary.status(), BatchStatus::Completed);
    assert_eq!(summary.processed(), 2);
    assert!(!summary.is_partial());
}

#[test]
fn test_cancelled_batch_reports_partial_summary() {
    let fixture = fixture(&[true, true, true]);
    let mut pipeline = pipeline(&fixture);
    pipeline.cancel_flag().cancel();

    let summary = pipeline.run_batch(&fixture.jobs, true);

    assert_eq!(summary.status(), BatchStatus::Cancelled);
    assert_eq!(summary.processed(), 0);
    assert!(summary.is_partial());
    assert!(summary.operations().is_empty());
    assert_filled_with(&fixture.jobs[0].target, 0xA5).unwrap();
}

#[test]
fn test_empty_batch_is_complete() {
    let fixture = fixture(&[]);
    let mut pipeline = pipeline(&fixture);

    let summary = pipeline.run_batch(&fixture.jobs, false);

    assert_eq!(summary.status(), BatchStatus::Completed);
    assert_eq!(summary.requested(), 0);
    assert!(!summary.is_partial());
}

#![allow(dead_code)]
/// Common test utilities for integration tests
///
/// This module provides shared functionality including:
/// - Scripted collaborators (flaky ledger, failing store)
/// - Target builders and a pass-recording device access
/// - Byte-pattern assertions

pub mod assertions;
pub mod collaborators;
pub mod targets;

use std::sync::Arc;
use std::time::Duration;
use wipe_ledger::crypto::{JsonCertificateIssuer, Sha256HashGenerator};
use wipe_ledger::error::RetryPolicy;
use wipe_ledger::io::DeviceAccess;
use wipe_ledger::ledger::Ledger;
use wipe_ledger::store::PersistenceStore;
use wipe_ledger::{PipelineOrchestrator, WipeEngine};

use collaborators::RecordingSleeper;

/// Assemble a pipeline from real hashing and certificate issuance plus the
/// given ledger, store and device access. Retry waits are recorded, not slept.
pub fn pipeline_with(
    access: Arc<dyn DeviceAccess>,
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn PersistenceStore>,
    sleeper: Arc<RecordingSleeper>,
) -> PipelineOrchestrator {
    let engine = WipeEngine::new(access)
        .with_sleeper(sleeper.clone())
        .with_destroy_time_unit(Duration::from_millis(1));
    let issuer = JsonCertificateIssuer::new("integration-key").with_ledger(ledger.clone());

    PipelineOrchestrator::new(
        engine,
        Arc::new(Sha256HashGenerator::new()),
        ledger,
        Arc::new(issuer),
        store,
    )
    .with_retry_policy(RetryPolicy::new(3, Duration::from_secs(1)).with_sleeper(sleeper))
}

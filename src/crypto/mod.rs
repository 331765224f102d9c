pub mod certificates;
pub mod digest;


use crate::error::CollaboratorError;
use crate::ledger::LedgerReference;
use crate::{DeviceDescriptor, WipeOutcome};

// Re-export
pub use certificates::{CertificateHandle, JsonCertificateIssuer, WipeCertificate};
pub use digest::{is_sha256_hex, Sha256HashGenerator};

/// Derives the opaque digest that binds ledger entry and certificate to a wipe.
///
/// Must be deterministic for identical outcome fields.
#[cfg_attr(test, mockall::automock)]
pub trait HashGenerator: Send + Sync {
    fn hash(&self, outcome: &WipeOutcome) -> Result<String, CollaboratorError>;
}

/// Issues a certificate for a recorded wipe.
///
/// Implementations must fail with `MissingLedgerReference` rather than issue
/// anything when `ledger_reference` is `None`.
#[cfg_attr(test, mockall::automock)]
pub trait CertificateIssuer: Send + Sync {
    fn issue(
        &self,
        outcome: &WipeOutcome,
        digest: &str,
        ledger_reference: Option<LedgerReference>,
        device: &DeviceDescriptor,
    ) -> Result<CertificateHandle, CollaboratorError>;
}

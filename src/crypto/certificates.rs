use super::CertificateIssuer;
use crate::error::CollaboratorError;
use crate::ledger::{Ledger, LedgerReference};
use crate::{DeviceClass, DeviceDescriptor, WipeMethod, WipeOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WipeCertificate {
    pub certificate_id: String,
    pub device: DeviceCertInfo,
    pub wipe_details: WipeDetails,
    pub evidence: LedgerEvidence,
    pub issued_at: DateTime<Utc>,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCertInfo {
    pub device_id: String,
    pub class: DeviceClass,
    pub declared_capacity: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WipeDetails {
    pub operation_id: String,
    pub method: WipeMethod,
    pub passes_completed: u32,
    pub bytes_wiped: u64,
    pub duration_ms: i64,
    pub operator_id: String,
    pub verified: Option<bool>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvidence {
    pub content_hash: String,
    pub ledger_reference: LedgerReference,
    /// Filled when the issuer can look the reference up
    pub block_ref: Option<u64>,
    pub confirmations: Option<u64>,
}

/// Where an issued certificate can be found again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateHandle {
    pub certificate_id: String,
    pub path: Option<PathBuf>,
}

/// Issues SHA-256 signed JSON certificates.
pub struct JsonCertificateIssuer {
    signing_key: String,
    output_dir: Option<PathBuf>,
    ledger: Option<Arc<dyn Ledger>>,
}

impl JsonCertificateIssuer {
    pub fn new(signing_key: impl Into<String>) -> Self {
        Self {
            signing_key: signing_key.into(),
            output_dir: None,
            ledger: None,
        }
    }

    /// Write each certificate to `<dir>/<certificate_id>.json`
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Enrich the evidence section with block ref and confirmations
    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn generate_certificate(
        &self,
        outcome: &WipeOutcome,
        digest: &str,
        ledger_reference: LedgerReference,
        device: &DeviceDescriptor,
    ) -> Result<WipeCertificate, CollaboratorError> {
        if !outcome.success {
            return Err(CollaboratorError::InvalidInput(format!(
                "operation {} did not complete successfully",
                outcome.operation_id
            )));
        }
        if digest.trim().is_empty() {
            return Err(CollaboratorError::InvalidInput(
                "content hash is required".to_string(),
            ));
        }

        // A failed lookup only leaves the optional evidence fields empty.
        let lookup = self
            .ledger
            .as_ref()
            .and_then(|ledger| match ledger.get_record(&ledger_reference) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(reference = %ledger_reference, error = %e, "Ledger lookup for certificate failed");
                    None
                }
            });

        let mut certificate = WipeCertificate {
            certificate_id: Uuid::new_v4().to_string(),
            device: DeviceCertInfo {
                device_id: device.id().to_string(),
                class: device.class(),
                declared_capacity: device.declared_capacity(),
            },
            wipe_details: WipeDetails {
                operation_id: outcome.operation_id.clone(),
                method: outcome.method,
                passes_completed: outcome.passes_completed,
                bytes_wiped: outcome.bytes_wiped,
                duration_ms: outcome.duration().num_milliseconds(),
                operator_id: outcome.operator_id.clone(),
                verified: outcome.verified,
                completed_at: outcome.end_time,
            },
            evidence: LedgerEvidence {
                content_hash: digest.to_string(),
                ledger_reference,
                block_ref: lookup.as_ref().map(|r| r.block_ref),
                confirmations: lookup.as_ref().map(|r| r.confirmations),
            },
            issued_at: Utc::now(),
            signature: String::new(),
        };

        certificate.signature = self.sign(&certificate)?;
        Ok(certificate)
    }

    /// SHA-256 over the unsigned certificate JSON followed by the signing key
    pub fn sign(&self, certificate: &WipeCertificate) -> Result<String, CollaboratorError> {
        let mut unsigned = certificate.clone();
        unsigned.signature = String::new();

        let json_data = serde_json::to_string(&unsigned)?;

        let mut hasher = Sha256::new();
        hasher.update(json_data.as_bytes());
        hasher.update(self.signing_key.as_bytes());

        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn verify_certificate(&self, certificate: &WipeCertificate) -> Result<bool, CollaboratorError> {
        Ok(self.sign(certificate)? == certificate.signature)
    }

    pub fn save_certificate(
        &self,
        certificate: &WipeCertificate,
        dir: &Path,
    ) -> Result<PathBuf, CollaboratorError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", certificate.certificate_id));
        let json_data = serde_json::to_string_pretty(certificate)?;
        fs::write(&path, json_data)?;
        Ok(path)
    }

    pub fn load_certificate(path: &Path) -> Result<WipeCertificate, CollaboratorError> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

impl CertificateIssuer for JsonCertificateIssuer {
    fn issue(
        &self,
        outcome: &WipeOutcome,
        digest: &str,
        ledger_reference: Option<LedgerReference>,
        device: &DeviceDescriptor,
    ) -> Result<CertificateHandle, CollaboratorError> {
        let reference = ledger_reference.ok_or(CollaboratorError::MissingLedgerReference)?;
        let certificate = self.generate_certificate(outcome, digest, reference, device)?;

        let path = match &self.output_dir {
            Some(dir) => Some(self.save_certificate(&certificate, dir)?),
            None => None,
        };

        tracing::info!(
            certificate_id = %certificate.certificate_id,
            operation_id = %outcome.operation_id,
            device_id = %certificate.device.device_id,
            "Issued wipe certificate"
        );

        Ok(CertificateHandle {
            certificate_id: certificate.certificate_id,
            path,
        })
    }
}

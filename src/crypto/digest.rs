use super::HashGenerator;
use crate::error::CollaboratorError;
use crate::{WipeMethod, WipeOutcome};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest
pub const SHA256_HEX_LEN: usize = 64;

pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == SHA256_HEX_LEN && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Canonical hash input. Field order is part of the format.
#[derive(Serialize)]
struct HashInput<'a> {
    bytes_wiped: u64,
    device_id: &'a str,
    method: WipeMethod,
    operation_id: &'a str,
    operator: &'a str,
    passes: u32,
    start_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    verification_data: Option<&'a str>,
}

/// SHA-256 over a canonical JSON rendering of a successful outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256HashGenerator;

impl Sha256HashGenerator {
    pub fn new() -> Self {
        Self
    }

    fn canonical_payload(outcome: &WipeOutcome) -> Result<Vec<u8>, CollaboratorError> {
        if !outcome.success {
            return Err(CollaboratorError::InvalidInput(
                "cannot hash a failed wipe".to_string(),
            ));
        }

        for (field, value) in [
            ("device_id", outcome.device_id.as_str()),
            ("operation_id", outcome.operation_id.as_str()),
            ("operator", outcome.operator_id.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(CollaboratorError::InvalidInput(format!(
                    "required field '{}' is empty",
                    field
                )));
            }
        }

        let input = HashInput {
            bytes_wiped: outcome.bytes_wiped,
            device_id: &outcome.device_id,
            method: outcome.method,
            operation_id: &outcome.operation_id,
            operator: &outcome.operator_id,
            passes: outcome.passes_completed,
            start_time: outcome.start_time.to_rfc3339(),
            verification_data: outcome.verification_digest.as_deref(),
        };

        Ok(serde_json::to_vec(&input)?)
    }

    /// Recompute the digest of `outcome` and compare it with `expected`.
    pub fn verify(&self, outcome: &WipeOutcome, expected: &str) -> Result<bool, CollaboratorError> {
        let expected = expected.trim();
        if !is_sha256_hex(expected) {
            return Err(CollaboratorError::InvalidInput(format!(
                "expected {} hex characters, got {:?}",
                SHA256_HEX_LEN, expected
            )));
        }

        Ok(self.hash(outcome)?.eq_ignore_ascii_case(expected))
    }
}

impl HashGenerator for Sha256HashGenerator {
    fn hash(&self, outcome: &WipeOutcome) -> Result<String, CollaboratorError> {
        let payload = Self::canonical_payload(outcome)?;
        Ok(format!("{:x}", Sha256::digest(&payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn outcome() -> WipeOutcome {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        WipeOutcome {
            operation_id: "op-1".into(),
            device_id: "DEV-0001".into(),
            method: WipeMethod::Purge,
            operator_id: "tech".into(),
            passes_completed: 3,
            bytes_wiped: 12288,
            start_time: start,
            end_time: start + chrono::Duration::seconds(2),
            success: true,
            verified: Some(true),
            verification_digest: Some("ab".repeat(32)),
            error_reason: None,
            error_kind: None,
        }
    }

    #[test]
    fn test_hash_is_deterministic_sha256() {
        let generator = Sha256HashGenerator::new();
        let first = generator.hash(&outcome()).unwrap();
        let second = generator.hash(&outcome()).unwrap();

        assert_eq!(first, second);
        assert!(is_sha256_hex(&first));
    }

    #[test]
    fn test_hash_changes_with_fields() {
        let generator = Sha256HashGenerator::new();
        let mut other = outcome();
        other.passes_completed = 1;

        assert_ne!(generator.hash(&outcome()).unwrap(), generator.hash(&other).unwrap());
    }

    #[test]
    fn test_failed_outcome_is_rejected() {
        let mut failed = outcome();
        failed.success = false;

        let err = Sha256HashGenerator::new().hash(&failed).unwrap_err();
        assert!(matches!(err, CollaboratorError::InvalidInput(_)));
    }

    #[test]
    fn test_empty_operator_is_rejected() {
        let mut anonymous = outcome();
        anonymous.operator_id = " ".into();

        assert!(Sha256HashGenerator::new().hash(&anonymous).is_err());
    }

    #[test]
    fn test_verify_round_trip_and_format_check() {
        let generator = Sha256HashGenerator::new();
        let digest = generator.hash(&outcome()).unwrap();

        assert!(generator.verify(&outcome(), &digest).unwrap());
        assert!(generator.verify(&outcome(), &digest.to_uppercase()).unwrap());
        assert!(!generator.verify(&outcome(), &"0".repeat(64)).unwrap());
        assert!(generator.verify(&outcome(), "not-a-digest").is_err());
    }
}

use super::{Ledger, LedgerEndpoint, LedgerRecord, LedgerReference};
use crate::crypto::digest::is_sha256_hex;
use crate::error::CollaboratorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// `previous_hash` of the first entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One link of the chain. `entry_hash` covers every other field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub index: u64,
    pub reference: LedgerReference,
    pub device_id: String,
    pub digest: String,
    pub recorded_at: DateTime<Utc>,
    pub previous_hash: String,
    pub entry_hash: String,
}

impl LedgerEntry {
    fn seal(
        index: u64,
        device_id: &str,
        digest: &str,
        recorded_at: DateTime<Utc>,
        previous_hash: &str,
    ) -> Self {
        let entry_hash = Self::compute_hash(index, device_id, digest, &recorded_at, previous_hash);
        let reference = LedgerReference::new(format!("LDG-{:08}-{}", index, &entry_hash[..16]));

        Self {
            index,
            reference,
            device_id: device_id.to_string(),
            digest: digest.to_string(),
            recorded_at,
            previous_hash: previous_hash.to_string(),
            entry_hash,
        }
    }

    fn compute_hash(
        index: u64,
        device_id: &str,
        digest: &str,
        recorded_at: &DateTime<Utc>,
        previous_hash: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(index.to_le_bytes());
        hasher.update(device_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(digest.as_bytes());
        hasher.update(recorded_at.to_rfc3339().as_bytes());
        hasher.update(previous_hash.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn recomputed_hash(&self) -> String {
        Self::compute_hash(
            self.index,
            &self.device_id,
            &self.digest,
            &self.recorded_at,
            &self.previous_hash,
        )
    }

    /// Serialized size of the entry, reported as its cost
    pub fn payload_size(&self) -> u64 {
        serde_json::to_vec(self).map(|v| v.len() as u64).unwrap_or(0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("entry {position} carries index {found}")]
    IndexGap { position: u64, found: u64 },

    #[error("entry {index} does not link to its predecessor")]
    BrokenLink { index: u64 },

    #[error("entry {index} content does not match its hash")]
    HashMismatch { index: u64 },
}

/// Hash-chained ledger held in memory, optionally mirrored to a JSON-lines file.
pub struct LocalLedger {
    endpoint: LedgerEndpoint,
    journal: Option<PathBuf>,
    entries: Mutex<Vec<LedgerEntry>>,
}

impl LocalLedger {
    pub fn in_memory() -> Self {
        Self {
            endpoint: LedgerEndpoint::Memory,
            journal: None,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Open (or create) a journal file and load its entries.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CollaboratorError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut entries = Vec::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (number, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry: LedgerEntry = serde_json::from_str(&line).map_err(|e| {
                    CollaboratorError::InvalidInput(format!(
                        "malformed ledger line {} in {}: {}",
                        number + 1,
                        path.display(),
                        e
                    ))
                })?;
                entries.push(entry);
            }
        }

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened ledger journal");

        Ok(Self {
            endpoint: LedgerEndpoint::File(path.clone()),
            journal: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// Connect through the endpoint allow-list.
    ///
    /// RPC endpoints pass the allow-list but have no transport here.
    pub fn connect(endpoint: &str) -> Result<Self, CollaboratorError> {
        match LedgerEndpoint::parse(endpoint)? {
            LedgerEndpoint::Memory => Ok(Self::in_memory()),
            LedgerEndpoint::File(path) => Self::open(path),
            rpc @ LedgerEndpoint::Rpc { .. } => Err(CollaboratorError::Unavailable(format!(
                "no RPC transport available for {}",
                rpc
            ))),
        }
    }

    pub fn endpoint(&self) -> &LedgerEndpoint {
        &self.endpoint
    }

    fn lock_entries(&self) -> MutexGuard<'_, Vec<LedgerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.lock_entries().clone()
    }

    /// Whether any entry was ever recorded for `device_id`
    pub fn is_device_recorded(&self, device_id: &str) -> bool {
        self.lock_entries().iter().any(|e| e.device_id == device_id)
    }

    /// Walk the chain from genesis. Returns the number of entries checked.
    pub fn verify_chain(&self) -> Result<usize, ChainError> {
        let entries = self.lock_entries();
        let mut previous = GENESIS_HASH;

        for (position, entry) in entries.iter().enumerate() {
            let position = position as u64;
            if entry.index != position {
                return Err(ChainError::IndexGap {
                    position,
                    found: entry.index,
                });
            }
            if entry.previous_hash != previous {
                return Err(ChainError::BrokenLink { index: entry.index });
            }
            if entry.recomputed_hash() != entry.entry_hash {
                return Err(ChainError::HashMismatch { index: entry.index });
            }
            previous = entry.entry_hash.as_str();
        }

        Ok(entries.len())
    }

    fn append_to_journal(path: &Path, entry: &LedgerEntry) -> Result<(), CollaboratorError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }
}

impl Ledger for LocalLedger {
    fn record(&self, device_id: &str, digest: &str) -> Result<LedgerReference, CollaboratorError> {
        if device_id.trim().is_empty() {
            return Err(CollaboratorError::InvalidInput(
                "device id is required".to_string(),
            ));
        }
        if !is_sha256_hex(digest) {
            return Err(CollaboratorError::InvalidInput(format!(
                "digest must be 64 hex characters, got {} characters",
                digest.len()
            )));
        }

        let mut entries = self.lock_entries();
        let previous = entries
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let entry = LedgerEntry::seal(entries.len() as u64, device_id, digest, Utc::now(), &previous);

        if let Some(path) = &self.journal {
            Self::append_to_journal(path, &entry)?;
        }

        tracing::info!(
            device_id = device_id,
            reference = %entry.reference,
            index = entry.index,
            "Recorded wipe digest in ledger"
        );

        let reference = entry.reference.clone();
        entries.push(entry);
        Ok(reference)
    }

    fn get_record(&self, reference: &LedgerReference) -> Result<LedgerRecord, CollaboratorError> {
        let entries = self.lock_entries();
        let entry = entries
            .iter()
            .find(|e| &e.reference == reference)
            .ok_or_else(|| {
                CollaboratorError::InvalidInput(format!("unknown ledger reference {}", reference))
            })?;

        Ok(LedgerRecord {
            reference: entry.reference.clone(),
            device_id: entry.device_id.clone(),
            digest: entry.digest.clone(),
            recorded_at: entry.recorded_at,
            confirmations: entries.len() as u64 - entry.index,
            block_ref: entry.index,
            cost_units: entry.payload_size(),
        })
    }
}

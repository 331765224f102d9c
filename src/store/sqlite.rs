/// SQLite-backed operation history
///
/// Each operation is one row keyed by operation id. Saving the same operation
/// again replaces the row, so the stored record always reflects the latest
/// pipeline state. The full operation is kept as JSON next to a few indexed
/// columns used for listing and summaries.
use super::PersistenceStore;
use crate::error::CollaboratorError;
use crate::pipeline::PipelineOperation;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Saves slower than this are logged
const SLOW_SAVE_THRESHOLD_MS: u128 = 100;

/// Aggregate view over every stored operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSummary {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub average_wipe_duration_ms: Option<f64>,
}

pub struct SqliteOperationStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteOperationStore {
    /// Create or open the database, creating parent directories as needed.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .context("Failed to create operation database directory")?;
        }

        let conn = Connection::open(&db_path).context("Failed to open operation database")?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode")?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .context("Failed to set synchronous mode")?;

        Self::with_connection(conn, db_path)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn, PathBuf::from(":memory:"))
    }

    fn with_connection(conn: Connection, db_path: PathBuf) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS operations (
                operation_id TEXT PRIMARY KEY NOT NULL,
                device_id TEXT NOT NULL,
                target TEXT NOT NULL,
                method TEXT NOT NULL,
                state TEXT NOT NULL,
                success INTEGER NOT NULL,
                failure_stage TEXT,
                failure_reason TEXT,
                content_hash TEXT,
                ledger_reference TEXT,
                certificate_id TEXT,
                wipe_duration_ms INTEGER,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_operations_device ON operations(device_id);
            CREATE INDEX IF NOT EXISTS idx_operations_updated ON operations(last_updated);
            "#,
        )
        .context("Failed to create operation schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn upsert(&self, operation: &PipelineOperation) -> Result<(), CollaboratorError> {
        let start = Instant::now();
        let payload = serde_json::to_string(operation)?;

        let mut conn = self.connection();
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO operations (
                operation_id, device_id, target, method, state, success,
                failure_stage, failure_reason, content_hash, ledger_reference,
                certificate_id, wipe_duration_ms, payload, created_at, last_updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(operation_id)
            DO UPDATE SET
                state = excluded.state,
                success = excluded.success,
                failure_stage = excluded.failure_stage,
                failure_reason = excluded.failure_reason,
                content_hash = excluded.content_hash,
                ledger_reference = excluded.ledger_reference,
                certificate_id = excluded.certificate_id,
                wipe_duration_ms = excluded.wipe_duration_ms,
                payload = excluded.payload,
                last_updated = excluded.last_updated
            "#,
            params![
                operation.operation_id,
                operation.device.id(),
                operation.target.to_string_lossy().into_owned(),
                operation.directive.method.to_string(),
                operation.state.to_string(),
                operation.is_success(),
                operation.failure.as_ref().map(|f| f.stage.to_string()),
                operation.failure.as_ref().map(|f| f.reason.clone()),
                operation.content_hash,
                operation.ledger_reference.as_ref().map(|r| r.to_string()),
                operation.certificate.as_ref().map(|c| c.certificate_id.clone()),
                operation
                    .wipe_outcome
                    .as_ref()
                    .map(|o| o.duration().num_milliseconds()),
                payload,
                operation.created_at.to_rfc3339(),
                operation.last_updated.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_SAVE_THRESHOLD_MS {
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                operation_id = %operation.operation_id,
                "Operation save was slow"
            );
        }

        Ok(())
    }

    pub fn load(&self, operation_id: &str) -> Result<Option<PipelineOperation>> {
        let payload: Option<String> = self
            .connection()
            .query_row(
                "SELECT payload FROM operations WHERE operation_id = ?1",
                params![operation_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to load operation")?;

        payload
            .map(|json| serde_json::from_str(&json).context("Stored operation is corrupt"))
            .transpose()
    }

    /// Most recently updated operations first
    pub fn recent(&self, limit: usize) -> Result<Vec<PipelineOperation>> {
        let conn = self.connection();
        let mut stmt = conn
            .prepare("SELECT payload FROM operations ORDER BY last_updated DESC LIMIT ?1")
            .context("Failed to prepare history query")?;

        let payloads = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))
            .context("Failed to query history")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect history")?;

        payloads
            .iter()
            .map(|json| serde_json::from_str(json).context("Stored operation is corrupt"))
            .collect()
    }

    pub fn summary(&self) -> Result<OperationSummary> {
        let (total, successful, average): (i64, Option<i64>, Option<f64>) = self
            .connection()
            .query_row(
                "SELECT COUNT(*), SUM(success), AVG(wipe_duration_ms) FROM operations",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .context("Failed to summarize operations")?;

        let total = total as u64;
        let successful = successful.unwrap_or(0) as u64;

        Ok(OperationSummary {
            total,
            successful,
            failed: total - successful,
            success_rate: if total == 0 {
                0.0
            } else {
                successful as f64 / total as f64
            },
            average_wipe_duration_ms: average,
        })
    }
}

impl PersistenceStore for SqliteOperationStore {
    fn save(&self, operation: &PipelineOperation) -> Result<(), CollaboratorError> {
        self.upsert(operation)
    }
}

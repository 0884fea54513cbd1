//! SQLite-backed store for step memos and workflow status.
//!
//! This module is feature-gated behind `sqlite-persistence`.
//!
//! The connection is opened per operation under a store-level mutex; each
//! mutating statement autocommits, so a crash after an operation returns
//! guarantees the write survives. WAL journal mode keeps a reopened store on
//! the same file readable while another handle is live.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::engine::identity::Seq;
use crate::engine::record::StepRecord;
use crate::engine::status::{StepStatus, WorkflowStatus};
use crate::engine::store::{now_millis, Store, StoreError};

fn map_store_err(prefix: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("{prefix}: {err}"))
}

/// SQLite-backed [`Store`].
pub struct SqliteStore {
    db_path: PathBuf,
    lock: Mutex<()>,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn open_connection(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = Path::new(&self.db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| map_store_err("create parent dir", e))?;
            }
        }
        let conn =
            Connection::open(&self.db_path).map_err(|e| map_store_err("open sqlite db", e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| map_store_err("set journal_mode", e))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| map_store_err("set synchronous", e))?;
        self.ensure_schema(&conn)?;
        Ok(conn)
    }

    fn ensure_schema(&self, conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS steps (
                workflow_id   TEXT NOT NULL,
                step_key      TEXT NOT NULL,
                step_name     TEXT NOT NULL,
                sequence_id   INTEGER NOT NULL,
                status        TEXT CHECK(status IN ('RUNNING','COMPLETED','FAILED')) NOT NULL,
                output        TEXT,
                error         TEXT,
                retry_count   INTEGER NOT NULL DEFAULT 0,
                next_retry_at INTEGER,
                created_at    INTEGER NOT NULL,
                updated_at    INTEGER NOT NULL,
                PRIMARY KEY (workflow_id, step_key)
            );
            CREATE TABLE IF NOT EXISTS workflows (
                workflow_id TEXT PRIMARY KEY,
                status      TEXT CHECK(status IN ('RUNNING','CANCELLED','COMPLETED')) NOT NULL,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );
            ",
        )
        .map_err(|e| map_store_err("ensure schema", e))?;
        Ok(())
    }

    fn row_to_step(row: &rusqlite::Row<'_>) -> rusqlite::Result<StepRecord> {
        let status_text: String = row.get(4)?;
        let status = StepStatus::parse(&status_text).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("unknown step status: {status_text}").into(),
            )
        })?;
        Ok(StepRecord {
            workflow_id: row.get(0)?,
            step_key: row.get(1)?,
            step_name: row.get(2)?,
            sequence_id: row.get::<_, i64>(3)? as Seq,
            status,
            output: row.get(5)?,
            error: row.get(6)?,
            retry_count: row.get::<_, i64>(7)? as u32,
            next_retry_at: row.get::<_, Option<i64>>(8)?.map(|v| v as u64),
            created_at: row.get::<_, i64>(9)? as u64,
            updated_at: row.get::<_, i64>(10)? as u64,
        })
    }
}

const STEP_COLUMNS: &str = "workflow_id, step_key, step_name, sequence_id, status, \
     output, error, retry_count, next_retry_at, created_at, updated_at";

impl Store for SqliteStore {
    fn find(&self, workflow_id: &str, step_key: &str) -> Result<Option<StepRecord>, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        conn.query_row(
            &format!("SELECT {STEP_COLUMNS} FROM steps WHERE workflow_id = ?1 AND step_key = ?2"),
            params![workflow_id, step_key],
            Self::row_to_step,
        )
        .optional()
        .map_err(|e| map_store_err("find step", e))
    }

    fn mark_running(
        &self,
        workflow_id: &str,
        step_key: &str,
        step_name: &str,
        sequence_id: Seq,
    ) -> Result<(), StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        let now = now_millis() as i64;
        conn.execute(
            "INSERT INTO steps
                 (workflow_id, step_key, step_name, sequence_id, status, retry_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'RUNNING', 0, ?5, ?5)
             ON CONFLICT (workflow_id, step_key)
             DO UPDATE SET step_name = excluded.step_name,
                           sequence_id = excluded.sequence_id,
                           status = 'RUNNING',
                           output = NULL,
                           error = NULL,
                           retry_count = 0,
                           next_retry_at = NULL,
                           updated_at = excluded.updated_at",
            params![workflow_id, step_key, step_name, sequence_id as i64, now],
        )
        .map_err(|e| map_store_err("mark running", e))?;
        Ok(())
    }

    fn mark_completed(
        &self,
        workflow_id: &str,
        step_key: &str,
        output: &str,
    ) -> Result<(), StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        conn.execute(
            "UPDATE steps
             SET status = 'COMPLETED', output = ?1, updated_at = ?2
             WHERE workflow_id = ?3 AND step_key = ?4",
            params![output, now_millis() as i64, workflow_id, step_key],
        )
        .map_err(|e| map_store_err("mark completed", e))?;
        Ok(())
    }

    fn mark_failed(
        &self,
        workflow_id: &str,
        step_key: &str,
        error: &str,
    ) -> Result<(), StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        conn.execute(
            "UPDATE steps
             SET status = 'FAILED', error = ?1, updated_at = ?2
             WHERE workflow_id = ?3 AND step_key = ?4",
            params![error, now_millis() as i64, workflow_id, step_key],
        )
        .map_err(|e| map_store_err("mark failed", e))?;
        Ok(())
    }

    fn mark_failed_with_retry(
        &self,
        workflow_id: &str,
        step_key: &str,
        error: &str,
        retry_count: u32,
        next_retry_at: u64,
    ) -> Result<(), StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        conn.execute(
            "UPDATE steps
             SET status = 'FAILED', error = ?1, retry_count = ?2, next_retry_at = ?3, updated_at = ?4
             WHERE workflow_id = ?5 AND step_key = ?6",
            params![
                error,
                retry_count as i64,
                next_retry_at as i64,
                now_millis() as i64,
                workflow_id,
                step_key
            ],
        )
        .map_err(|e| map_store_err("mark failed with retry", e))?;
        Ok(())
    }

    fn upsert_workflow(&self, workflow_id: &str, status: WorkflowStatus) -> Result<(), StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        let now = now_millis() as i64;
        conn.execute(
            "INSERT INTO workflows (workflow_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT (workflow_id)
             DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
            params![workflow_id, status.as_str(), now],
        )
        .map_err(|e| map_store_err("upsert workflow", e))?;
        Ok(())
    }

    fn workflow_status(&self, workflow_id: &str) -> Result<Option<WorkflowStatus>, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        let status_text: Option<String> = conn
            .query_row(
                "SELECT status FROM workflows WHERE workflow_id = ?1",
                params![workflow_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| map_store_err("read workflow status", e))?;
        match status_text {
            Some(text) => WorkflowStatus::parse(&text)
                .map(Some)
                .ok_or_else(|| map_store_err("decode workflow status", &text)),
            None => Ok(None),
        }
    }

    fn completed_steps(&self, workflow_id: &str) -> Result<Vec<StepRecord>, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| map_store_err("lock poisoned", "mutex poisoned"))?;
        let conn = self.open_connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {STEP_COLUMNS} FROM steps
                 WHERE workflow_id = ?1 AND status = 'COMPLETED'
                 ORDER BY sequence_id ASC"
            ))
            .map_err(|e| map_store_err("prepare completed scan", e))?;
        let rows = stmt
            .query_map(params![workflow_id], Self::row_to_step)
            .map_err(|e| map_store_err("query completed scan", e))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| map_store_err("row decode", e))?);
        }
        Ok(out)
    }
}

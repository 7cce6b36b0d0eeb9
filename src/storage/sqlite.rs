//! SQLite-backed key-value store.
//!
//! Durable equivalent of browser local storage for the native tooling. A
//! batch runs inside one transaction, which is what keeps the scene catalog
//! and scene entries consistent.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument, trace};

use super::{KeyValueStore, WriteOp};
use crate::error::{PanelError, Result};

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Key-value store in a single SQLite table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates a database at the given path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PanelError::Storage(format!(
                    "Failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        debug!(path = %path.display(), "Opening storage database");
        let conn = Connection::open(path)
            .map_err(|e| PanelError::Storage(format!("Failed to open database: {e}")))?;

        let store = Self::with_connection(conn)?;
        info!(path = %path.display(), "Storage database ready");
        Ok(store)
    }

    /// Creates an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            PanelError::Storage(format!("Failed to create in-memory database: {e}"))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| PanelError::Storage(format!("Failed to initialize schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PanelError::Storage("database lock poisoned".to_string()))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| PanelError::Storage(format!("Failed to read '{key}': {e}")))
    }

    #[instrument(skip_all, fields(ops = ops.len()))]
    fn apply_batch(&self, ops: &[WriteOp]) -> Result<()> {
        let mut conn = self.lock()?;
        let write_err = |key: &str, e: rusqlite::Error| PanelError::StorageWrite {
            key: key.to_string(),
            reason: e.to_string(),
        };

        let tx = conn
            .transaction()
            .map_err(|e| PanelError::Storage(format!("Failed to start transaction: {e}")))?;
        let now = chrono::Utc::now().to_rfc3339();

        for op in ops {
            match op {
                WriteOp::Put { key, value } => {
                    tx.execute(
                        "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                        updated_at = excluded.updated_at",
                        params![key, value, now],
                    )
                    .map_err(|e| write_err(key, e))?;
                }
                WriteOp::Delete { key } => {
                    tx.execute("DELETE FROM kv WHERE key = ?1", params![key])
                        .map_err(|e| write_err(key, e))?;
                }
            }
        }

        tx.commit()
            .map_err(|e| PanelError::Storage(format!("Failed to commit transaction: {e}")))?;
        trace!(ops = ops.len(), "Storage batch committed");
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
            .map_err(|e| PanelError::Storage(format!("Failed to prepare key listing: {e}")))?;
        let rows = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))
            .map_err(|e| PanelError::Storage(format!("Failed to list keys: {e}")))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PanelError::Storage(format!("Failed to read key: {e}")))
    }
}

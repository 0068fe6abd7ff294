// session-scoped key/value storage backed by SQLite
// holds the last good dashboard snapshot; wiped when the app exits

use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

pub const DASHBOARD_DATA_KEY: &str = "dashboardData";
pub const DASHBOARD_GENERATED_AT_KEY: &str = "dashboardGeneratedAt";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to create storage dir: {0}")]
    Io(#[from] std::io::Error),
    #[error("db error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("lock error: {0}")]
    Lock(String),
}

/// `<data dir>/mira/session.db`
pub fn default_db_path(data_dir: Option<PathBuf>) -> PathBuf {
    data_dir
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mira")
        .join("session.db")
}

pub struct SessionStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SessionStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!(path = %path.display(), "opening session store");
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS session_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_db<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> SqlResult<T>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        Ok(f(&guard)?)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.with_db(|conn| {
            conn.query_row(
                "SELECT value FROM session_kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.with_db(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO session_kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, value, chrono::Utc::now().timestamp()],
            )?;
            Ok(())
        })?;
        debug!(key, bytes = value.len(), "stored session value");
        Ok(())
    }

    /// write several keys in one transaction
    pub fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        let tx = guard.transaction()?;
        let now = chrono::Utc::now().timestamp();
        for (key, value) in entries {
            tx.execute(
                "INSERT OR REPLACE INTO session_kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, value, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.with_db(|conn| {
            conn.execute("DELETE FROM session_kv WHERE key = ?1", params![key])?;
            Ok(())
        })
    }

    /// drop everything; called when the app exits
    pub fn clear(&self) -> Result<(), StorageError> {
        let removed = self.with_db(|conn| conn.execute("DELETE FROM session_kv", []))?;
        info!(removed, "cleared session store");
        Ok(())
    }
}

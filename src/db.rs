use crate::error::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

/// Narrow handle over the backing SQLite database. All store and access-log
/// operations go through [`Db::with`], which serializes access to the single
/// connection; there is no other shared state between requests.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Store(format!("creating {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS faces (
                id         TEXT PRIMARY KEY,
                name       TEXT NOT NULL UNIQUE,
                vector     TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS access_logs (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                face_id    TEXT,
                name       TEXT,
                confidence REAL,
                action     TEXT NOT NULL,
                timestamp  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_access_logs_timestamp
                ON access_logs(timestamp);
            CREATE INDEX IF NOT EXISTS idx_access_logs_action
                ON access_logs(action);",
        )
    }

    /// Run `f` with exclusive access to the connection.
    pub(crate) fn with<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Store("database connection lock poisoned".into()))?;
        f(&conn).map_err(Error::from)
    }
}

//! SQLite-backed relational store.
//!
//! [`SqliteStore`] owns the database location and a small pool of idle connections; each
//! ingestion checks out its own [`PooledConnection`]. Table reconciliation lives in [`sync`],
//! row loading in [`insert`].

pub mod insert;
pub mod naming;
pub mod sync;

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::StoreError;
use crate::types::{DataType, Field};

pub use insert::insert_rows;
pub use naming::table_name;
pub use sync::synchronize_table;

/// How long a connection waits for the database write lock before giving up.
///
/// Every ingestion holds the write lock for its whole load, across all tables, so this bounds
/// how long one file may wait behind another file's insert.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_IDLE_CONNECTIONS: usize = 8;

/// A persisted table ready to receive rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTable {
    /// Sanitized table name.
    pub name: String,
    /// Declared columns in table order.
    pub columns: Vec<Field>,
    /// True when this ingestion created the table.
    pub created: bool,
}

/// Process-wide handle to the SQLite database.
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
    idle: Mutex<Vec<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// Creates the parent directory if needed and switches the database to WAL so concurrent
    /// readers do not block the single writer.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Like [`SqliteStore::open`], with a custom wait for the write lock.
    pub fn open_with_busy_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            path,
            busy_timeout,
            idle: Mutex::new(Vec::new()),
        };
        let conn = store.open_connection()?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %store.path.display(), journal_mode = %mode, "opened store");
        store.release(conn);
        Ok(store)
    }

    /// Database file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check out a connection, opening a new one when the pool is empty.
    pub fn connection(&self) -> rusqlite::Result<PooledConnection<'_>> {
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => self.open_connection()?,
        };
        Ok(PooledConnection {
            store: self,
            conn: Some(conn),
        })
    }

    fn open_connection(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    fn release(&self, conn: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(conn);
        }
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("busy_timeout", &self.busy_timeout)
            .finish()
    }
}

/// A connection borrowed from a [`SqliteStore`]; returned to the pool on drop.
pub struct PooledConnection<'a> {
    store: &'a SqliteStore,
    conn: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // A connection still inside a transaction (should not happen) is discarded.
            if conn.is_autocommit() {
                self.store.release(conn);
            }
        }
    }
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Declared columns of `table`, or `None` when the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Option<Vec<Field>>> {
    let exists: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let columns = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let declared: String = row.get(2)?;
            Ok(Field::new(name, DataType::from_declared(&declared)))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Some(columns))
}

/// Number of rows currently in `table`.
pub fn row_count(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )
}

//! Storage layer for toggl-watch.
//!
//! Caches time entries in a single SQLite table using `rusqlite`.
//!
//! # Thread Safety
//!
//! [`Database`] wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The tool opens one connection per invocation and never shares it.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE timeEntries (
//!     id INTEGER NOT NULL PRIMARY KEY,
//!     user TEXT, description TEXT, project TEXT, client TEXT,
//!     duration INT,
//!     billable TEXT,
//!     date_of_entry INT
//! );
//! ```
//!
//! ## Billable Encoding
//!
//! `billable` has TEXT affinity, so the integers written here are stored as
//! `'1'` / `'0'`. Caches written by earlier tools may also contain `'true'` /
//! `'false'`. All of these decode; anything else is a conversion error.
//!
//! ## Timestamps
//!
//! `date_of_entry` holds the entry start as Unix seconds, which keeps the
//! prune query a plain integer comparison.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;
use tw_core::{Entry, EntryStore};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The directory holding the database file could not be created.
    #[error("failed to create {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A [`LazyDatabase`] was used before it was initialized.
    #[error("entry cache at {} has not been opened", path.display())]
    NotOpened { path: PathBuf },
}

/// A `billable` cell that is neither a boolean integer nor a known spelling.
#[derive(Debug, Error)]
#[error("invalid billable value: {0:?}")]
pub struct InvalidBillable(pub String);

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

/// Summary of the cached entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryStats {
    pub total: usize,
    pub billable: usize,
    pub oldest: Option<i64>,
    pub newest: Option<i64>,
}

const ENTRY_COLUMNS: &str =
    "id, user, description, project, client, duration, billable, date_of_entry";

impl Database {
    /// Opens a database at the given path, creating it and its parent
    /// directory if necessary.
    ///
    /// The schema is initialized on open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| DbError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        tracing::debug!(path = %path.display(), "opened entry cache");
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS timeEntries (
                id INTEGER NOT NULL PRIMARY KEY,
                user TEXT,
                description TEXT,
                project TEXT,
                client TEXT,
                duration INT,
                billable TEXT,
                date_of_entry INT
            );

            CREATE INDEX IF NOT EXISTS idx_time_entries_date ON timeEntries(date_of_entry);
            ",
        )?;
        Ok(())
    }

    /// Returns the cached entry with the given id.
    pub fn get_entry(&self, id: i64) -> Result<Option<Entry>, DbError> {
        let entry = self
            .conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM timeEntries WHERE id = ?"),
                [id],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Inserts or replaces a batch of entries in a single transaction.
    pub fn upsert_entries(&mut self, entries: &[Entry]) -> Result<usize, DbError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO timeEntries ({ENTRY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            ))?;
            for entry in entries {
                written += stmt.execute(params![
                    entry.id,
                    entry.user,
                    entry.description,
                    entry.project,
                    entry.client,
                    entry.duration,
                    entry.billable,
                    entry.date,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(written, "upserted entries");
        Ok(written)
    }

    /// Deletes entries dated at or before `cutoff` (Unix seconds).
    pub fn delete_entries_through(&mut self, cutoff: i64) -> Result<usize, DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM timeEntries WHERE date_of_entry <= ?", [cutoff])?;
        tracing::debug!(deleted, cutoff, "pruned entries");
        Ok(deleted)
    }

    /// Lists all cached entries ordered by date then id.
    pub fn list_entries(&self) -> Result<Vec<Entry>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM timeEntries ORDER BY date_of_entry ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], entry_from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Counts cached entries and reports their date range.
    ///
    /// Aggregated in SQL, so rows whose `billable` cell does not decode are
    /// still counted (as not billable).
    pub fn entry_stats(&self) -> Result<EntryStats, DbError> {
        let stats = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(billable IN ('1', 'true', 'TRUE')), 0),
                    MIN(date_of_entry),
                    MAX(date_of_entry)
             FROM timeEntries",
            [],
            |row| {
                Ok(EntryStats {
                    total: row.get(0)?,
                    billable: row.get(1)?,
                    oldest: row.get(2)?,
                    newest: row.get(3)?,
                })
            },
        )?;
        Ok(stats)
    }
}

impl EntryStore for Database {
    type Error = DbError;

    fn ensure_initialized(&mut self) -> Result<(), Self::Error> {
        self.init()
    }

    fn fetch_by_id(&self, id: i64) -> Result<Option<Entry>, Self::Error> {
        self.get_entry(id)
    }

    fn upsert_all(&mut self, entries: &[Entry]) -> Result<usize, Self::Error> {
        self.upsert_entries(entries)
    }

    fn delete_older_than(&mut self, cutoff: i64) -> Result<usize, Self::Error> {
        self.delete_entries_through(cutoff)
    }
}

/// An entry cache that is opened, and so created, only once
/// [`EntryStore::ensure_initialized`] runs.
///
/// Every other store operation fails with [`DbError::NotOpened`] until then.
pub struct LazyDatabase {
    path: PathBuf,
    db: Option<Database>,
}

impl LazyDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The opened database, if initialization has run.
    pub const fn database(&self) -> Option<&Database> {
        self.db.as_ref()
    }

    fn opened(&self) -> Result<&Database, DbError> {
        self.db.as_ref().ok_or_else(|| DbError::NotOpened {
            path: self.path.clone(),
        })
    }

    fn opened_mut(&mut self) -> Result<&mut Database, DbError> {
        self.db.as_mut().ok_or_else(|| DbError::NotOpened {
            path: self.path.clone(),
        })
    }
}

impl EntryStore for LazyDatabase {
    type Error = DbError;

    fn ensure_initialized(&mut self) -> Result<(), Self::Error> {
        if let Some(db) = &self.db {
            return db.init();
        }
        self.db = Some(Database::open(&self.path)?);
        Ok(())
    }

    fn fetch_by_id(&self, id: i64) -> Result<Option<Entry>, Self::Error> {
        self.opened()?.get_entry(id)
    }

    fn upsert_all(&mut self, entries: &[Entry]) -> Result<usize, Self::Error> {
        self.opened_mut()?.upsert_entries(entries)
    }

    fn delete_older_than(&mut self, cutoff: i64) -> Result<usize, Self::Error> {
        self.opened_mut()?.delete_entries_through(cutoff)
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get(0)?,
        user: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        project: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        client: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        duration: row.get::<_, Option<i64>>(5)?.unwrap_or_default(),
        billable: billable_from_row(row, 6)?,
        date: row.get(7)?,
    })
}

fn billable_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<bool> {
    let value = row.get_ref(idx)?;
    let decoded = match value {
        ValueRef::Integer(n) => Some(n != 0),
        ValueRef::Text(text) => match text {
            b"1" | b"true" | b"TRUE" => Some(true),
            b"0" | b"false" | b"FALSE" => Some(false),
            _ => None,
        },
        _ => None,
    };
    decoded.ok_or_else(|| {
        let raw = match value {
            ValueRef::Text(text) => String::from_utf8_lossy(text).into_owned(),
            other => format!("{other:?}"),
        };
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            value.data_type(),
            Box::new(InvalidBillable(raw)),
        )
    })
}

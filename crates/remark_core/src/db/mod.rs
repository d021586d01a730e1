//! Comment store bootstrap.
//!
//! # Responsibility
//! - Open the SQLite file that backs articles, comments and the viewer
//!   identity slot.
//! - Gate every store on a fully migrated connection before it reads a row.
//!
//! # Invariants
//! - `PRAGMA user_version` equals the last applied migration step.
//! - A store only accepts a connection whose version matches this build and
//!   whose tables it reads are present.

use log::warn;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Comment store bootstrap and transport failures.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// File was migrated by a newer build; refusing to touch comment rows.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Connection was opened without running the comment migrations.
    SchemaNotReady { db_version: u32, required: u32 },
    /// A table a store reads from is absent after migration.
    MissingTable(&'static str),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "comment store schema {db_version} is newer than supported {latest_supported}"
            ),
            Self::SchemaNotReady {
                db_version,
                required,
            } => write!(
                f,
                "comment store schema {db_version} is not migrated; open it with `open_db` (need {required})"
            ),
            Self::MissingTable(table) => write!(f, "comment store is missing table `{table}`"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Checks that `conn` is at this build's schema and carries `tables`.
///
/// Stores call this from `try_new` so a raw, unmigrated connection fails
/// up front instead of on the first query.
pub fn ensure_schema_ready(conn: &Connection, tables: &[&'static str]) -> DbResult<()> {
    let db_version = migrations::current_user_version(conn)?;
    let required = migrations::latest_version();
    if db_version != required {
        warn!(
            "event=schema_check module=db status=error db_version={} required={}",
            db_version, required
        );
        return Err(DbError::SchemaNotReady {
            db_version,
            required,
        });
    }

    for &table in tables {
        if !table_exists(conn, table)? {
            warn!("event=schema_check module=db status=error missing_table={table}");
            return Err(DbError::MissingTable(table));
        }
    }
    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
        [table],
        |row| row.get::<_, bool>(0),
    )
}

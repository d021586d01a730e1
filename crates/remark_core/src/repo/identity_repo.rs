//! Per-viewer identity slot.
//!
//! Remembers the commenter name/email of the last successful submission so
//! the next form can be prefilled. Exactly one slot exists per store.

use crate::db::{ensure_schema_ready, DbError};
use crate::model::comment::validate_submission;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type IdentityResult<T> = Result<T, IdentityError>;

/// Errors from identity slot persistence.
#[derive(Debug)]
pub enum IdentityError {
    Db(DbError),
}

impl Display for IdentityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "identity slot: {err}"),
        }
    }
}

impl Error for IdentityError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
        }
    }
}

impl From<DbError> for IdentityError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for IdentityError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Remembered commenter identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerIdentity {
    pub name: String,
    pub email: Option<String>,
}

/// Durable storage for the viewer identity slot.
pub trait IdentityStore {
    /// Loads the remembered identity, if any.
    fn load(&self) -> IdentityResult<Option<ViewerIdentity>>;
    /// Replaces the remembered identity.
    fn save(&self, identity: &ViewerIdentity) -> IdentityResult<()>;
}

/// Process-local identity slot.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    slot: RefCell<Option<ViewerIdentity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> IdentityResult<Option<ViewerIdentity>> {
        Ok(self.slot.borrow().clone())
    }

    fn save(&self, identity: &ViewerIdentity) -> IdentityResult<()> {
        *self.slot.borrow_mut() = Some(identity.clone());
        Ok(())
    }
}

/// SQLite-backed identity slot (`viewer_identity`, single row).
pub struct SqliteIdentityStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteIdentityStore<'conn> {
    pub fn try_new(conn: &'conn Connection) -> IdentityResult<Self> {
        ensure_schema_ready(conn, &["viewer_identity"])?;
        Ok(Self { conn })
    }
}

impl IdentityStore for SqliteIdentityStore<'_> {
    fn load(&self) -> IdentityResult<Option<ViewerIdentity>> {
        let row: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT author_name, author_email FROM viewer_identity WHERE slot = 1;",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        // A slot that no longer validates is treated as empty.
        Ok(row.and_then(|(name, email)| {
            validate_submission(&name, "-", email.as_deref())
                .ok()
                .map(|valid| ViewerIdentity {
                    name: valid.author_name,
                    email: valid.author_email,
                })
        }))
    }

    fn save(&self, identity: &ViewerIdentity) -> IdentityResult<()> {
        self.conn.execute(
            "INSERT INTO viewer_identity (slot, author_name, author_email, updated_at)
             VALUES (1, ?1, ?2, (strftime('%s', 'now') * 1000))
             ON CONFLICT(slot) DO UPDATE SET
                author_name = excluded.author_name,
                author_email = excluded.author_email,
                updated_at = excluded.updated_at;",
            params![identity.name.as_str(), identity.email.as_deref()],
        )?;
        Ok(())
    }
}

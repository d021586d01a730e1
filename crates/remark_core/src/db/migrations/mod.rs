//! Comment store schema steps.
//!
//! Each step names the tables it introduces; after the SQL runs those
//! tables are checked before `user_version` moves forward, so a step that
//! silently created nothing never counts as applied.

use crate::db::{table_exists, DbError, DbResult};
use log::info;
use rusqlite::{Connection, Transaction};

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
    creates: &'static [&'static str],
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "comments",
        sql: include_str!("0001_comments.sql"),
        creates: &["articles", "comments"],
    },
    SchemaStep {
        version: 2,
        name: "viewer_identity",
        sql: include_str!("0002_viewer_identity.sql"),
        creates: &["viewer_identity"],
    },
];

/// Schema version this build writes and expects.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |step| step.version)
}

/// Brings `conn` up to `latest_version()` in one transaction.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file is ahead of this build.
/// - `MissingTable` when a step's SQL did not produce its tables.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from_version = current_user_version(conn)?;
    let latest = latest_version();
    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }

    let pending: Vec<&SchemaStep> = STEPS
        .iter()
        .filter(|step| step.version > from_version)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in pending {
        run_step(&tx, step)?;
    }
    tx.commit()?;
    Ok(())
}

fn run_step(tx: &Transaction<'_>, step: &SchemaStep) -> DbResult<()> {
    tx.execute_batch(step.sql)?;
    for &table in step.creates {
        if !table_exists(tx, table)? {
            return Err(DbError::MissingTable(table));
        }
    }
    tx.pragma_update(None, "user_version", step.version)?;
    info!(
        "event=db_migrate module=db status=ok step={} version={} tables={}",
        step.name,
        step.version,
        step.creates.join(",")
    );
    Ok(())
}

/// Reads `PRAGMA user_version` from `conn`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))?)
}

#[cfg(test)]
mod tests {
    use super::{latest_version, STEPS};

    #[test]
    fn steps_are_strictly_increasing_from_one() {
        let versions: Vec<u32> = STEPS.iter().map(|step| step.version).collect();
        let expected: Vec<u32> = (1..=latest_version()).collect();
        assert_eq!(versions, expected);
    }

    #[test]
    fn every_step_declares_its_tables() {
        assert!(STEPS.iter().all(|step| !step.creates.is_empty()));
    }
}

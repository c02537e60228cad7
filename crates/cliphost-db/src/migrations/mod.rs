//! Embedded schema migrations, applied in order at pool start.

use rusqlite::{Connection, Result};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration {0} failed: {1}")]
    Failed(usize, String),
}

struct Migration {
    version: usize,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "assets",
    sql: include_str!("001_assets.sql"),
}];

fn init_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;
    Ok(())
}

fn get_current_version(conn: &Connection) -> Result<usize> {
    conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
        row.get::<_, Option<usize>>(0)
    })
    .map(|v| v.unwrap_or(0))
}

/// Apply every migration newer than the recorded schema version.
///
/// Each migration runs in its own transaction. Returns how many were applied.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    init_migrations_table(conn)?;
    let current = get_current_version(conn)?;

    let mut applied = 0;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn.unchecked_transaction()?;

        tx.execute_batch(migration.sql)
            .map_err(|e| MigrationError::Failed(migration.version, e.to_string()))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?, ?)",
            rusqlite::params![migration.version, migration.name],
        )
        .map_err(|e| MigrationError::Failed(migration.version, e.to_string()))?;

        tx.commit()
            .map_err(|e| MigrationError::Failed(migration.version, e.to_string()))?;
        applied += 1;
    }

    Ok(applied)
}

/// Recorded schema version, creating the bookkeeping table if needed.
pub fn current_version(conn: &Connection) -> Result<usize, MigrationError> {
    init_migrations_table(conn)?;
    Ok(get_current_version(conn)?)
}

/// Newest embedded migration.
pub fn latest_version() -> usize {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_migrations_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        assert_eq!(run_migrations(&conn).unwrap(), MIGRATIONS.len());
        assert_eq!(current_version(&conn).unwrap(), latest_version());
        assert_eq!(run_migrations(&conn).unwrap(), 0);
    }
}

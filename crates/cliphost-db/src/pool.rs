//! Connection pool management.

use cliphost_common::{Error, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::migrations;

/// Connection pool type.
pub type DbPool = Pool<SqliteConnectionManager>;

/// A connection checked out of [`DbPool`].
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Open (or create) the database at `db_path` and bring its schema up to date.
///
/// WAL mode is enabled so readers on the streaming path do not block the
/// transcode workers updating the processing flag.
///
/// ```no_run
/// use cliphost_db::pool::init_pool;
///
/// let pool = init_pool("/var/lib/cliphost/catalog.sqlite").unwrap();
/// ```
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
    });

    let pool = Pool::builder()
        .max_size(4)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create connection pool: {}", e)))?;

    migrate(&pool)?;
    Ok(pool)
}

/// In-memory pool for tests.
///
/// Every SQLite `:memory:` connection is its own database, so the pool holds
/// exactly one connection.
pub fn init_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory();

    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create in-memory pool: {}", e)))?;

    migrate(&pool)?;
    Ok(pool)
}

/// Check out a connection, converting the r2d2 error.
pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("Failed to get connection from pool: {}", e)))
}

fn migrate(pool: &DbPool) -> Result<()> {
    let conn = get_conn(pool)?;
    migrations::run_migrations(&conn)
        .map_err(|e| Error::database(format!("Failed to run migrations: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_memory_pool() {
        let pool = init_memory_pool().unwrap();
        assert_eq!(pool.max_size(), 1);
    }

    #[test]
    fn test_migrations_run_on_init() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='assets'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_file_pool_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.sqlite");
        let path = path.to_str().unwrap();

        {
            let pool = init_pool(path).unwrap();
            let conn = get_conn(&pool).unwrap();
            conn.execute(
                "INSERT INTO assets (id, processing, views, created_at) VALUES (?, 1, 0, ?)",
                rusqlite::params!["a", "2024-01-01T00:00:00Z"],
            )
            .unwrap();
        }

        let pool = init_pool(path).unwrap();
        let conn = get_conn(&pool).unwrap();
        let processing: bool = conn
            .query_row("SELECT processing FROM assets WHERE id = 'a'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(processing);
    }
}

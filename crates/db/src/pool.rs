//! Connection pool management.
//!
//! This module provides the [`Database`] struct which wraps an r2d2 connection
//! pool for SQLite. Readers take a connection per call; the single writer
//! borrows one for the lifetime of its transaction (see [`crate::store`]).
//!
//! File databases run in WAL mode so readers keep seeing the last committed
//! state while the writer holds an open transaction.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::DbError;
use crate::migrations;

/// A pooled SQLite connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pragmas applied to every file-backed connection.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA busy_timeout = 5000;
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
";

/// Upper bound on pooled connections for a file database.
const MAX_POOL_SIZE: u32 = 8;

/// Database handle with connection pooling.
///
/// # Example
///
/// ```no_run
/// use ledgersync_db::Database;
///
/// let db = Database::open("ledger.db")?;
///
/// let count: i64 = db.with_connection(|conn| {
///     conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))
///         .map_err(Into::into)
/// })?;
/// # Ok::<(), ledgersync_db::DbError>(())
/// ```
pub struct Database {
    pub(crate) pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Opens (or creates) a database file and brings its schema up to date.
    ///
    /// The parent directory is created if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.execute_batch(CONNECTION_PRAGMAS));
        let pool = Pool::builder().max_size(MAX_POOL_SIZE).build(manager)?;

        let db = Self { pool };
        db.initialize()?;
        info!(path = %path.display(), "Opened ledger database");
        Ok(db)
    }

    /// Opens a private in-memory database.
    ///
    /// Every SQLite in-memory connection is its own database, so the pool is
    /// pinned to a single connection that never expires.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;

        let db = Self { pool };
        db.initialize()?;
        Ok(db)
    }

    /// Creates the schema on an empty database or migrates an existing one.
    fn initialize(&self) -> Result<(), DbError> {
        self.with_connection(|conn| {
            if has_schema(conn)? {
                migrations::run_migrations(conn)
            } else {
                debug!("Empty database, creating schema");
                migrations::initialize_schema(conn)
            }
        })
    }

    /// Obtains a connection from the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is exhausted or a connection cannot
    /// be established.
    pub fn connection(&self) -> Result<PooledConnection, DbError> {
        self.pool.get().map_err(DbError::from)
    }

    /// Executes a closure with a pooled connection.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError>,
    {
        let conn = self.connection()?;
        f(&conn)
    }

    /// Returns the schema version recorded in the database.
    pub fn schema_version(&self) -> Result<i32, DbError> {
        self.with_connection(migrations::get_schema_version)
    }
}

fn has_schema(conn: &Connection) -> Result<bool, DbError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'storestate'",
        [],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("Database")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::CURRENT_VERSION;

    #[test]
    fn test_open_in_memory_initializes_schema() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version().unwrap(), CURRENT_VERSION);
        let tables: i64 = db
            .with_connection(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
                     AND name IN ('accounts', 'trustlines', 'offers', 'ledgerheaders')",
                    [],
                    |row| row.get(0),
                )
                .map_err(Into::into)
            })
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn test_open_file_creates_parent_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.db");
        {
            let db = Database::open(&path).unwrap();
            db.with_connection(|conn| {
                conn.execute(
                    "INSERT INTO storestate (statename, state) VALUES ('reopen_check', x'01')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        }
        let db = Database::open(&path).unwrap();
        let value: Vec<u8> = db
            .with_connection(|conn| {
                conn.query_row(
                    "SELECT state FROM storestate WHERE statename = 'reopen_check'",
                    [],
                    |row| row.get(0),
                )
                .map_err(Into::into)
            })
            .unwrap();
        assert_eq!(value, vec![1]);
    }
}

//! Database schema migrations.
//!
//! Migrations are applied sequentially, one version at a time, each in its
//! own transaction. A database newer than [`CURRENT_VERSION`] is refused.
//!
//! To add a migration, bump [`CURRENT_VERSION`] and append a `Migration`
//! whose `from_version` is the previous version. Keep the SQL idempotent
//! (`IF NOT EXISTS`, `IF EXISTS`).

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::error::DbError;
use crate::schema::state_keys;

/// Current database schema version.
pub const CURRENT_VERSION: i32 = 3;

struct Migration {
    from_version: i32,
    to_version: i32,
    upgrade_sql: &'static str,
    description: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        from_version: 1,
        to_version: 2,
        upgrade_sql: r#"
            CREATE TABLE IF NOT EXISTS ledgerheaders (
                ledgerhash TEXT PRIMARY KEY,
                prevhash TEXT NOT NULL,
                statehash TEXT NOT NULL,
                ledgerseq INTEGER UNIQUE NOT NULL,
                closetime INTEGER NOT NULL,
                data BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS ledgerheaders_seq ON ledgerheaders(ledgerseq);
        "#,
        description: "Add ledger header history",
    },
    Migration {
        from_version: 2,
        to_version: 3,
        upgrade_sql: r#"
            CREATE INDEX IF NOT EXISTS trustlines_low ON trustlines(lowaccount);
            CREATE INDEX IF NOT EXISTS trustlines_high ON trustlines(highaccount);
        "#,
        description: "Index trust lines by account",
    },
];

/// Retrieves the schema version from the database.
///
/// Returns version 1 if no version is recorded.
pub fn get_schema_version(conn: &Connection) -> Result<i32, DbError> {
    let raw: Option<Vec<u8>> = conn
        .query_row(
            "SELECT state FROM storestate WHERE statename = ?1",
            params![state_keys::DATABASE_SCHEMA],
            |row| row.get(0),
        )
        .optional()?;

    let Some(raw) = raw else {
        return Ok(1);
    };
    let text = String::from_utf8(raw)
        .map_err(|_| DbError::Migration("schema version is not UTF-8".to_string()))?;
    text.trim()
        .parse()
        .map_err(|_| DbError::Migration(format!("Invalid schema version: {}", text)))
}

/// Records the schema version in the database.
pub fn set_schema_version(conn: &Connection, version: i32) -> Result<(), DbError> {
    conn.execute(
        "INSERT OR REPLACE INTO storestate (statename, state) VALUES (?1, ?2)",
        params![state_keys::DATABASE_SCHEMA, version.to_string().into_bytes()],
    )?;
    Ok(())
}

/// Returns `true` if the schema is older than [`CURRENT_VERSION`].
pub fn needs_migration(conn: &Connection) -> Result<bool, DbError> {
    Ok(get_schema_version(conn)? < CURRENT_VERSION)
}

/// Runs all necessary migrations to bring the database up to date.
///
/// # Errors
///
/// Returns an error if the database version is newer than
/// [`CURRENT_VERSION`], if a step is missing, or if migration SQL fails.
pub fn run_migrations(conn: &Connection) -> Result<(), DbError> {
    let mut current_version = get_schema_version(conn)?;

    if current_version > CURRENT_VERSION {
        return Err(DbError::Migration(format!(
            "Database version {} is newer than supported version {}",
            current_version, CURRENT_VERSION
        )));
    }
    if current_version == CURRENT_VERSION {
        return Ok(());
    }

    info!(
        from = current_version,
        to = CURRENT_VERSION,
        "Migrating database schema"
    );

    while current_version < CURRENT_VERSION {
        let migration = MIGRATIONS
            .iter()
            .find(|m| m.from_version == current_version)
            .ok_or_else(|| {
                DbError::Migration(format!(
                    "No migration found from version {}",
                    current_version
                ))
            })?;

        info!(
            "Applying migration {} -> {}: {}",
            migration.from_version, migration.to_version, migration.description
        );

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.upgrade_sql)?;
        set_schema_version(&tx, migration.to_version)?;
        tx.commit()?;

        current_version = migration.to_version;
    }

    info!(version = CURRENT_VERSION, "Database schema up to date");
    Ok(())
}

/// Fails unless the schema is exactly [`CURRENT_VERSION`].
pub fn verify_schema(conn: &Connection) -> Result<(), DbError> {
    let version = get_schema_version(conn)?;
    if version < CURRENT_VERSION {
        return Err(DbError::Migration(format!(
            "Database schema version {} is too old, run upgrade-db first",
            version
        )));
    }
    if version > CURRENT_VERSION {
        return Err(DbError::Migration(format!(
            "Database schema version {} is newer than this software supports ({})",
            version, CURRENT_VERSION
        )));
    }
    Ok(())
}

/// Creates every table on an empty database and stamps [`CURRENT_VERSION`].
pub fn initialize_schema(conn: &Connection) -> Result<(), DbError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(crate::schema::CREATE_STATE_TABLES)?;
    tx.execute_batch(crate::schema::CREATE_ENTRY_TABLES)?;
    set_schema_version(&tx, CURRENT_VERSION)?;
    tx.commit()?;

    info!(version = CURRENT_VERSION, "Initialized database schema");
    Ok(())
}

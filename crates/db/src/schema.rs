//! Database schema definitions.
//!
//! # Tables
//!
//! - **State management**: `storestate` - durable key/value markers
//! - **Ledger history**: `ledgerheaders` - one row per closed ledger
//! - **Entry projection**: `accounts`, `trustlines`, `offers` - one row per
//!   tracked ledger entry, rebuilt wholesale on a full import
//!
//! # Versioning
//!
//! The schema version is tracked in the `storestate` table and managed by
//! the [`migrations`](crate::migrations) module.

/// Tables that are never dropped: markers and ledger history.
pub const CREATE_STATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS storestate (
    statename TEXT PRIMARY KEY,
    state BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS ledgerheaders (
    ledgerhash TEXT PRIMARY KEY,
    prevhash TEXT NOT NULL,
    statehash TEXT NOT NULL,
    ledgerseq INTEGER UNIQUE NOT NULL,
    closetime INTEGER NOT NULL,
    data BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS ledgerheaders_seq ON ledgerheaders(ledgerseq);
"#;

/// The entry projection tables.
pub const CREATE_ENTRY_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    accountid TEXT PRIMARY KEY,
    balance INTEGER NOT NULL,
    sequence INTEGER NOT NULL,
    ownercount INTEGER NOT NULL,
    transferrate INTEGER NOT NULL,
    inflationdest TEXT,
    publickey TEXT NOT NULL,
    requiredest INTEGER NOT NULL,
    requireauth INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS trustlines (
    trustindex TEXT PRIMARY KEY,
    lowaccount TEXT NOT NULL,
    highaccount TEXT NOT NULL,
    currency TEXT NOT NULL,
    lowlimit INTEGER NOT NULL,
    highlimit INTEGER NOT NULL,
    balance INTEGER NOT NULL,
    lowauthset INTEGER NOT NULL,
    highauthset INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS trustlines_low ON trustlines(lowaccount);
CREATE INDEX IF NOT EXISTS trustlines_high ON trustlines(highaccount);

CREATE TABLE IF NOT EXISTS offers (
    accountid TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    takerpayscurrency TEXT NOT NULL,
    takerpaysamount INTEGER NOT NULL,
    takerpaysissuer TEXT NOT NULL,
    takergetscurrency TEXT NOT NULL,
    takergetsamount INTEGER NOT NULL,
    takergetsissuer TEXT NOT NULL,
    expiration INTEGER NOT NULL,
    passive INTEGER NOT NULL,
    PRIMARY KEY (accountid, sequence)
);
"#;

/// Drops the entry projection tables, indexes included.
pub const DROP_ENTRY_TABLES: &str = r#"
DROP TABLE IF EXISTS accounts;
DROP TABLE IF EXISTS trustlines;
DROP TABLE IF EXISTS offers;
"#;

/// Well-known keys for the `storestate` table.
pub mod state_keys {
    /// Root hash and encoded header of the current snapshot.
    ///
    /// Only ever advanced to a ledger whose full projection is committed.
    pub const LAST_CLOSED_LEDGER: &str = "lastClosedLedger";

    /// Root hash of the target of an in-flight full import.
    ///
    /// Written before the import's first row mutation, emptied as its last
    /// step. A non-empty value at startup means the import was interrupted.
    pub const LEDGER_TO_IMPORT: &str = "ledgerToImport";

    /// Current database schema version.
    pub const DATABASE_SCHEMA: &str = "databaseschema";
}

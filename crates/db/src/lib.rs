//! SQLite persistence for ledgersync.
//!
//! This crate holds the relational projection of the ledger state: one row
//! per account, trust line and offer, plus the durable markers that make
//! catch-up crash safe and the history of closed ledger headers.
//!
//! # Architecture
//!
//! - [`Database`]: r2d2 connection pool with schema setup and migrations
//! - [`LedgerStore`]: the single writer, with two-level nested transactions
//! - [`queries`]: per-table query traits implemented on `rusqlite::Connection`
//!
//! # Example
//!
//! ```no_run
//! use ledgersync_db::{EntryQueries, LedgerStore};
//!
//! let store = LedgerStore::open("ledger.db")?;
//! let counts = store.with_connection(|conn| conn.count_entries())?;
//! println!("{} entries", counts.total());
//! # Ok::<(), ledgersync_db::DbError>(())
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod queries;
pub mod schema;
pub mod store;

pub use error::DbError;
pub use pool::{Database, PooledConnection};
pub use queries::{
    AccountQueries, EntryCounts, EntryQueries, LedgerQueries, OfferQueries, StateQueries,
    TrustLineQueries,
};
pub use schema::state_keys;
pub use store::{LedgerStore, StoreTransaction, MAX_TRANSACTION_DEPTH};

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DbError>;

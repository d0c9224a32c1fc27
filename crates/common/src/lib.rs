//! Common types and utilities for ledgersync.
//!
//! This crate provides the vocabulary shared by the persistence layer and the
//! synchronization engine:
//!
//! - [`Hash256`]: the 256-bit identifier used for tree roots and entry indexes
//! - [`content_address`]: domain-separated addressing of ledger entries
//! - [`LedgerEntry`]: the typed entry model (accounts, trust lines, offers)
//! - [`TreeItem`]: the raw form of an entry as stored in the state tree
//! - [`LedgerHeader`]: per-ledger metadata persisted alongside each snapshot
//! - [`Config`]: node configuration loaded from TOML

pub mod address;
pub mod config;
pub mod entry;
pub mod error;
pub mod header;
pub mod item;
pub mod types;

pub use address::{content_address, sha512_half};
pub use config::{Config, DatabaseConfig, LogFormat, LogLevel, LoggingConfig, SyncConfig};
pub use entry::{
    AccountEntry, AccountId, Amount, Currency, EntryKind, LedgerEntry, OfferEntry, TrustLineEntry,
};
pub use error::{Error, Result};
pub use header::{LastClosedLedger, LedgerHeader};
pub use item::TreeItem;
pub use types::Hash256;

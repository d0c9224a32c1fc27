//! Ledger state synchronization for ledgersync.
//!
//! This crate keeps the relational projection of the ledger (one row per
//! account, trust line and offer) consistent with the authenticated state
//! tree.
//!
//! # Overview
//!
//! - [`StateTree`]: what the engine needs from a tree version (root hash,
//!   bounded diff, iteration, completeness), with [`MemoryTree`] as an
//!   in-memory implementation
//! - [`LedgerSnapshot`]: a tree version paired with its ledger header
//! - [`EntryChange`] / [`LedgerDelta`]: classified and coalesced entry changes
//! - [`LedgerManager`]: delta and full catch-up, crash recovery and ledger
//!   close
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ledgersync_db::LedgerStore;
//! use ledgersync_ledger::{
//!     LedgerManager, LedgerManagerConfig, MemorySnapshotSource, MemoryTree,
//! };
//!
//! let store = Arc::new(LedgerStore::open("ledger.db")?);
//! let source = MemorySnapshotSource::new();
//! let manager: LedgerManager<MemoryTree> =
//!     LedgerManager::open(store, &source, LedgerManagerConfig::default())?;
//! manager.resume_interrupted_import(&source)?;
//! println!("at ledger {}", manager.current_ledger_seq());
//! # Ok::<(), ledgersync_ledger::LedgerError>(())
//! ```

mod close;
mod delta;
mod error;
mod manager;
mod progress;
mod snapshot;
mod tree;

pub use close::{
    EntryWriter, LedgerCloseData, LedgerCloseResult, LedgerCloseStats, MemoryTreeFinalizer,
    TransactionApplier, TreeFinalizer,
};
pub use delta::{EntryChange, LedgerDelta};
pub use error::LedgerError;
pub use manager::{
    DeltaOutcome, LedgerManager, LedgerManagerConfig, LedgerManagerStats, NeedFullReason,
    SyncOutcome,
};
pub use progress::ProgressTracker;
pub use snapshot::{LedgerSnapshot, MemorySnapshotSource, SnapshotSource};
pub use tree::{compute_root, DiffError, ItemChange, MemoryTree, StateTree, TreeError, TreeItems};

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

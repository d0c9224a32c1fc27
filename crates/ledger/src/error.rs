//! Error types for ledger operations.

use ledgersync_common::Hash256;
use ledgersync_db::DbError;
use thiserror::Error;

use crate::tree::TreeError;

/// Errors that can occur during catch-up and ledger close.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error.
    ///
    /// Any failed row mutation lands here and aborts the enclosing
    /// transaction.
    #[error("database error: {0}")]
    Database(#[from] DbError),

    /// A tree item of a known kind could not be decoded.
    #[error("entry error: {0}")]
    Entry(#[from] ledgersync_common::Error),

    /// The tree for the target ledger is incomplete locally.
    ///
    /// Not fatal: fetch the missing nodes and retry.
    #[error("missing tree nodes for ledger {0}")]
    MissingTreeNodes(Hash256),

    /// Tree iteration failed during a full import.
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// A transaction of a close batch failed; the whole close was rolled back.
    #[error("transaction {index} failed: {source}")]
    Apply {
        index: usize,
        #[source]
        source: Box<LedgerError>,
    },

    /// Rejected by the business rules of the transaction applier.
    #[error("transaction rejected: {0}")]
    TransactionRejected(String),

    /// No tree is available locally for the given root.
    #[error("snapshot unavailable: {0}")]
    SnapshotUnavailable(Hash256),

    /// Attempted to sync to a snapshot that is still open.
    #[error("snapshot {0} is not closed")]
    NotClosed(Hash256),

    /// Close data does not follow the current ledger.
    #[error("invalid ledger sequence: expected {expected}, got {actual}")]
    InvalidSequence { expected: u32, actual: u32 },

    /// The close could not produce a consistent next ledger.
    #[error("invalid ledger close: {0}")]
    InvalidLedgerClose(String),
}

impl LedgerError {
    /// Returns `true` for failures a later attempt may get past without
    /// operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::MissingTreeNodes(_) | LedgerError::SnapshotUnavailable(_)
        )
    }
}

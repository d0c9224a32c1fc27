//! Ledger close plumbing.
//!
//! Closing a ledger runs a batch of transactions through an external
//! [`TransactionApplier`], which mutates entries through an [`EntryWriter`].
//! The recorded [`LedgerDelta`] is then handed to a [`TreeFinalizer`] that
//! produces the next closed snapshot.

use std::sync::Arc;

use ledgersync_common::{AccountEntry, AccountId, Hash256, LedgerEntry};
use ledgersync_db::{AccountQueries, DbError, EntryQueries, StoreTransaction};

use crate::delta::{EntryChange, LedgerDelta};
use crate::snapshot::LedgerSnapshot;
use crate::tree::{MemoryTree, StateTree};
use crate::{LedgerError, Result};

/// Data needed to close a ledger.
#[derive(Debug, Clone)]
pub struct LedgerCloseData<Tx> {
    /// The ledger sequence being closed.
    pub ledger_seq: u32,
    /// Transactions to apply, in order.
    pub transactions: Vec<Tx>,
    pub close_time: u64,
    /// Hash of the previous ledger header.
    pub prev_ledger_hash: Hash256,
}

impl<Tx> LedgerCloseData<Tx> {
    pub fn new(
        ledger_seq: u32,
        transactions: Vec<Tx>,
        close_time: u64,
        prev_ledger_hash: Hash256,
    ) -> Self {
        Self {
            ledger_seq,
            transactions,
            close_time,
            prev_ledger_hash,
        }
    }
}

/// Counters for one ledger close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCloseStats {
    pub tx_count: usize,
    pub entries_created: usize,
    pub entries_updated: usize,
    pub entries_deleted: usize,
    pub fee_pool_delta: i64,
}

impl LedgerCloseStats {
    pub(crate) fn from_delta(tx_count: usize, delta: &LedgerDelta) -> Self {
        let mut stats = Self {
            tx_count,
            fee_pool_delta: delta.fee_pool_delta(),
            ..Self::default()
        };
        for change in delta.changes() {
            match change {
                EntryChange::Created(_) => stats.entries_created += 1,
                EntryChange::Updated { .. } => stats.entries_updated += 1,
                EntryChange::Deleted { .. } => stats.entries_deleted += 1,
            }
        }
        stats
    }
}

/// Outcome of a successful close.
#[derive(Debug, Clone)]
pub struct LedgerCloseResult<T> {
    /// The new current snapshot.
    pub snapshot: LedgerSnapshot<T>,
    /// Hash of the new header.
    pub header_hash: Hash256,
    pub stats: LedgerCloseStats,
}

/// Entry access handed to a [`TransactionApplier`].
///
/// Every mutation goes to the store inside the transaction's savepoint and
/// is recorded in the delta with the entry's previous value.
pub struct EntryWriter<'a, 's> {
    tx: &'a StoreTransaction<'s>,
    delta: &'a mut LedgerDelta,
}

impl<'a, 's> EntryWriter<'a, 's> {
    pub fn new(tx: &'a StoreTransaction<'s>, delta: &'a mut LedgerDelta) -> Self {
        Self { tx, delta }
    }

    /// Loads the stored entry with the same key as `key`.
    pub fn load_entry(&self, key: &LedgerEntry) -> Result<Option<LedgerEntry>> {
        Ok(self.tx.with_connection(|conn| conn.load_entry(key))?)
    }

    pub fn load_account(&self, account_id: &AccountId) -> Result<Option<AccountEntry>> {
        Ok(self
            .tx
            .with_connection(|conn| conn.load_account(account_id))?)
    }

    /// Inserts an entry. Replacing an existing row is recorded as an update.
    pub fn store_add(&mut self, entry: LedgerEntry) -> Result<()> {
        let previous = self.load_entry(&entry)?;
        self.tx.store_add(&entry)?;
        match previous {
            Some(previous) => self.delta.record_update(previous, entry),
            None => self.delta.record_create(entry),
        }
        Ok(())
    }

    /// Overwrites an existing entry.
    ///
    /// # Errors
    ///
    /// Fails with a not-found database error if the entry does not exist.
    pub fn store_change(&mut self, entry: LedgerEntry) -> Result<()> {
        let previous = self.load_entry(&entry)?.ok_or_else(|| {
            DbError::NotFound(format!("{} {}", entry.kind(), entry.index()))
        })?;
        self.tx.store_change(&entry)?;
        self.delta.record_update(previous, entry);
        Ok(())
    }

    /// Deletes an entry. Deleting a missing entry records nothing.
    pub fn store_delete(&mut self, entry: &LedgerEntry) -> Result<()> {
        let previous = self.load_entry(entry)?;
        self.tx.store_delete(entry)?;
        if let Some(previous) = previous {
            self.delta.record_delete(previous);
        }
        Ok(())
    }

    /// Adds a collected fee to the ledger's fee pool.
    pub fn charge_fee(&mut self, fee: i64) {
        self.delta.record_fee_pool_delta(fee);
    }
}

/// The business-rule collaborator that turns transactions into entry changes.
pub trait TransactionApplier {
    type Transaction;

    /// Applies one transaction.
    ///
    /// An error aborts the whole close; nothing of the batch is committed.
    fn apply(&self, tx: &Self::Transaction, writer: &mut EntryWriter<'_, '_>) -> Result<()>;
}

/// The tree layer's half of a ledger close.
pub trait TreeFinalizer<T> {
    /// Builds the closed snapshot that follows `parent` once `delta` is
    /// applied.
    fn finalize(
        &self,
        parent: &LedgerSnapshot<T>,
        delta: &LedgerDelta,
        close_time: u64,
    ) -> Result<LedgerSnapshot<T>>;
}

/// Finalizes by copying the parent's [`MemoryTree`] and applying the delta.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryTreeFinalizer;

impl TreeFinalizer<MemoryTree> for MemoryTreeFinalizer {
    fn finalize(
        &self,
        parent: &LedgerSnapshot<MemoryTree>,
        delta: &LedgerDelta,
        close_time: u64,
    ) -> Result<LedgerSnapshot<MemoryTree>> {
        let mut upserts = Vec::new();
        let mut removals = Vec::new();
        for change in delta.changes() {
            match change.current_entry() {
                Some(entry) => upserts.push(entry.to_tree_item()?),
                None => removals.push(change.index()),
            }
        }

        let mut tree = parent.tree().as_ref().clone();
        tree.apply(upserts, removals);

        let mut header = parent.header().next(tree.root_hash(), close_time)?;
        header.fee_pool = header
            .fee_pool
            .checked_add_signed(delta.fee_pool_delta())
            .ok_or_else(|| LedgerError::InvalidLedgerClose("fee pool out of range".to_string()))?;

        Ok(LedgerSnapshot::closed(Arc::new(tree), header).with_parent(parent.root_hash()))
    }
}

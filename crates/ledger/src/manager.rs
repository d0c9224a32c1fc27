//! The ledger manager: keeps the relational projection in step with the
//! state tree.
//!
//! [`LedgerManager`] owns the current snapshot and moves it forward in two
//! ways:
//!
//! - **Catch-up** ([`ensure_sync`](LedgerManager::ensure_sync) /
//!   [`catch_up`](LedgerManager::catch_up)) adopts a snapshot closed by the
//!   network. A small gap is applied as a delta of changed items; a fresh
//!   node, an oversized or failed diff, or an interrupted earlier attempt
//!   imports the whole target instead.
//! - **Ledger close** ([`close_ledger`](LedgerManager::close_ledger)) applies
//!   a batch of transactions locally and finalizes the next snapshot.
//!
//! # Crash Safety
//!
//! Before any row is touched, catch-up durably records the target root in
//! the `ledgerToImport` marker. Long catch-ups checkpoint every
//! `batch_size` rows, so a crash can leave partial rows behind, but
//! `lastClosedLedger` only moves in the same commit that finishes the
//! projection and clears `ledgerToImport`. A restart that finds
//! `ledgerToImport` set re-imports that target from empty tables.
//!
//! # Thread Safety
//!
//! Catch-up and close are serialized by a manager-wide write lock, held from
//! before they read the current snapshot until after they publish the new
//! one, so they never interleave. Readers of
//! [`current_snapshot`](LedgerManager::current_snapshot) only take a short
//! read lock.

use std::sync::Arc;

use ledgersync_common::{Hash256, LastClosedLedger, LedgerEntry, SyncConfig};
use ledgersync_db::{DbError, LedgerStore, StateQueries, StoreTransaction};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::close::{
    EntryWriter, LedgerCloseData, LedgerCloseResult, LedgerCloseStats, TransactionApplier,
    TreeFinalizer,
};
use crate::delta::{EntryChange, LedgerDelta};
use crate::progress::ProgressTracker;
use crate::snapshot::{LedgerSnapshot, SnapshotSource};
use crate::tree::{DiffError, ItemChange, StateTree};
use crate::{LedgerError, Result};

/// Tuning for the ledger manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerManagerConfig {
    /// Largest diff applied incrementally.
    pub max_diff_threshold: usize,
    /// Rows processed between checkpoints.
    pub batch_size: usize,
    /// Default for the `check_local` argument of resumed imports.
    pub check_local_nodes: bool,
}

impl Default for LedgerManagerConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for LedgerManagerConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_diff_threshold: config.max_diff_threshold,
            batch_size: config.batch_size.max(1),
            check_local_nodes: config.check_local_nodes,
        }
    }
}

/// Lifetime counters of a ledger manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerManagerStats {
    pub delta_catch_ups: u64,
    pub full_imports: u64,
    /// Catch-ups that wanted a delta but had to import in full.
    pub delta_fallbacks: u64,
    pub ledgers_closed: u64,
    pub checkpoints: u64,
    /// Rows added, changed or deleted by catch-ups.
    pub entries_written: u64,
}

/// How a successful [`ensure_sync`](LedgerManager::ensure_sync) got there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The target was already current.
    AlreadySynced,
    /// Applied as a delta of `changes` differing items.
    Delta { changes: usize },
    /// Imported in full; `entries` rows written.
    FullImport { entries: u64 },
}

/// Why catch-up takes the full-import path.
#[derive(Debug, Clone)]
pub enum NeedFullReason {
    /// The current snapshot is the empty genesis ledger.
    FreshNode,
    /// An earlier catch-up toward this root did not finish.
    InterruptedImport(Hash256),
    /// No usable diff.
    Diff(DiffError),
}

/// Result of trying to compute a delta between the current snapshot and a
/// target.
#[derive(Debug, Clone)]
pub enum DeltaOutcome {
    Ready(Vec<ItemChange>),
    NeedFull(NeedFullReason),
}

/// Coordinates catch-up and ledger close over a [`LedgerStore`].
pub struct LedgerManager<T> {
    store: Arc<LedgerStore>,
    config: LedgerManagerConfig,
    current: RwLock<LedgerSnapshot<T>>,
    /// Held across a whole catch-up or close, including the swap of `current`.
    write_lock: Mutex<()>,
    stats: Mutex<LedgerManagerStats>,
}

impl<T: StateTree + Default> LedgerManager<T> {
    /// A manager starting from the empty genesis ledger.
    pub fn new(store: Arc<LedgerStore>, config: LedgerManagerConfig) -> Self {
        Self::with_snapshot(store, LedgerSnapshot::genesis(), config)
    }

    /// Restores the manager from the store's `lastClosedLedger` marker.
    ///
    /// The tree for the recorded root comes from `source`. Without a marker
    /// the manager starts from genesis.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::SnapshotUnavailable`] when `source` has no tree
    /// for the recorded root.
    pub fn open<S>(store: Arc<LedgerStore>, source: &S, config: LedgerManagerConfig) -> Result<Self>
    where
        S: SnapshotSource<T> + ?Sized,
    {
        let Some(last_closed) = store.last_closed_ledger()? else {
            info!("No last closed ledger recorded, starting from genesis");
            return Ok(Self::new(store, config));
        };

        let snapshot = if last_closed.root_hash.is_zero() {
            LedgerSnapshot::closed(Arc::new(T::default()), last_closed.header)
        } else {
            let found = source
                .snapshot(&last_closed.root_hash)
                .ok_or(LedgerError::SnapshotUnavailable(last_closed.root_hash))?;
            let snapshot = LedgerSnapshot::closed(Arc::clone(found.tree()), last_closed.header);
            match found.parent() {
                Some(parent) => snapshot.with_parent(parent),
                None => snapshot,
            }
        };

        info!(
            ledger_seq = snapshot.ledger_seq(),
            root = %snapshot.root_hash(),
            "Restored last closed ledger"
        );
        Ok(Self::with_snapshot(store, snapshot, config))
    }
}

impl<T: StateTree> LedgerManager<T> {
    /// A manager whose current state is `snapshot`.
    ///
    /// The caller is responsible for the store's rows matching it.
    pub fn with_snapshot(
        store: Arc<LedgerStore>,
        snapshot: LedgerSnapshot<T>,
        config: LedgerManagerConfig,
    ) -> Self {
        Self {
            store,
            config,
            current: RwLock::new(snapshot),
            write_lock: Mutex::new(()),
            stats: Mutex::new(LedgerManagerStats::default()),
        }
    }

    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    pub fn config(&self) -> &LedgerManagerConfig {
        &self.config
    }

    /// The last snapshot whose projection is fully committed.
    pub fn current_snapshot(&self) -> LedgerSnapshot<T> {
        self.current.read().clone()
    }

    pub fn current_root(&self) -> Hash256 {
        self.current.read().root_hash()
    }

    pub fn current_ledger_seq(&self) -> u32 {
        self.current.read().ledger_seq()
    }

    pub fn stats(&self) -> LedgerManagerStats {
        *self.stats.lock()
    }

    /// Brings the projection to `target` unless it is already there.
    ///
    /// With `check_local` set, a target whose tree is missing nodes is
    /// refused before anything is written.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotClosed`] if `target` is still open.
    /// - [`LedgerError::MissingTreeNodes`] if `check_local` is set and the
    ///   target tree is incomplete. Fetch the nodes and retry.
    /// - Any catch-up failure. The current snapshot is unchanged.
    pub fn ensure_sync(&self, target: &LedgerSnapshot<T>, check_local: bool) -> Result<SyncOutcome> {
        let target_root = target.root_hash();
        if !target.is_closed() {
            return Err(LedgerError::NotClosed(target_root));
        }
        if target_root == self.current_root() {
            debug!(root = %target_root, "Already synchronized");
            return Ok(SyncOutcome::AlreadySynced);
        }
        if check_local && target.has_missing_nodes() {
            warn!(root = %target_root, "Target tree has missing nodes, not syncing yet");
            return Err(LedgerError::MissingTreeNodes(target_root));
        }
        self.run_catch_up(target)
    }

    /// Moves the projection to `target` and returns the new current
    /// snapshot.
    ///
    /// On failure nothing past the last checkpoint is committed, the current
    /// snapshot and `lastClosedLedger` are unchanged, and `ledgerToImport`
    /// stays set so the next attempt imports in full.
    pub fn catch_up(&self, target: &LedgerSnapshot<T>) -> Result<LedgerSnapshot<T>> {
        if !target.is_closed() {
            return Err(LedgerError::NotClosed(target.root_hash()));
        }
        self.run_catch_up(target)?;
        Ok(self.current_snapshot())
    }

    /// Finishes a catch-up that a previous run left incomplete.
    ///
    /// Returns `None` when `ledgerToImport` is empty.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::SnapshotUnavailable`] when `source` cannot
    /// provide the recorded target.
    pub fn resume_interrupted_import<S>(&self, source: &S) -> Result<Option<SyncOutcome>>
    where
        S: SnapshotSource<T> + ?Sized,
    {
        let Some(root) = self.store.ledger_to_import()? else {
            return Ok(None);
        };
        info!(root = %root, "Resuming interrupted import");

        if root == self.current_root() {
            // The import committed but the marker was not cleared.
            let _write = self.write_lock.lock();
            let tx = self.store.begin_transaction()?;
            tx.clear_ledger_to_import()?;
            tx.commit()?;
            return Ok(Some(SyncOutcome::AlreadySynced));
        }

        let target = source
            .snapshot(&root)
            .ok_or(LedgerError::SnapshotUnavailable(root))?;
        self.ensure_sync(&target, self.config.check_local_nodes)
            .map(Some)
    }

    fn run_catch_up(&self, target: &LedgerSnapshot<T>) -> Result<SyncOutcome> {
        let target_root = target.root_hash();
        match self.catch_up_in_transaction(target) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(
                    root = %target_root,
                    ledger_seq = target.ledger_seq(),
                    error = %e,
                    "Catch-up failed, keeping current ledger"
                );
                Err(e)
            }
        }
    }

    fn catch_up_in_transaction(&self, target: &LedgerSnapshot<T>) -> Result<SyncOutcome> {
        let _write = self.write_lock.lock();
        let tx = self.store.begin_transaction()?;
        ensure_outermost(&tx, "catch-up")?;

        let current = self.current_snapshot();
        let target_root = target.root_hash();
        if current.root_hash() == target_root {
            tx.rollback()?;
            return Ok(SyncOutcome::AlreadySynced);
        }

        let interrupted = tx.with_connection(|conn| conn.get_ledger_to_import())?;
        tx.set_ledger_to_import(&target_root)?;
        tx.checkpoint()?;

        info!(
            from_seq = current.ledger_seq(),
            from_root = %current.root_hash(),
            to_seq = target.ledger_seq(),
            to_root = %target_root,
            "Catching up"
        );

        let outcome = match self.compute_delta(&current, target, interrupted) {
            DeltaOutcome::Ready(changes) => self.apply_delta(&tx, changes)?,
            DeltaOutcome::NeedFull(reason) => {
                match &reason {
                    NeedFullReason::FreshNode => {
                        info!("Fresh node, importing target in full");
                    }
                    NeedFullReason::InterruptedImport(previous) => {
                        warn!(previous = %previous, "Previous import did not finish, importing in full");
                        self.stats.lock().delta_fallbacks += 1;
                    }
                    NeedFullReason::Diff(e) => {
                        info!(reason = %e, "Delta unavailable, importing target in full");
                        self.stats.lock().delta_fallbacks += 1;
                    }
                }
                self.import_full(&tx, target)?
            }
        };

        tx.set_last_closed_ledger(&LastClosedLedger {
            root_hash: target_root,
            header: target.header().clone(),
        })?;
        tx.clear_ledger_to_import()?;
        tx.commit()?;
        *self.current.write() = target.clone();

        info!(
            ledger_seq = target.ledger_seq(),
            root = %target_root,
            outcome = ?outcome,
            "Caught up"
        );
        Ok(outcome)
    }

    /// Decides between the delta and full-import paths.
    pub fn compute_delta(
        &self,
        current: &LedgerSnapshot<T>,
        target: &LedgerSnapshot<T>,
        interrupted: Option<Hash256>,
    ) -> DeltaOutcome {
        if current.root_hash().is_zero() {
            return DeltaOutcome::NeedFull(NeedFullReason::FreshNode);
        }
        if let Some(previous) = interrupted {
            return DeltaOutcome::NeedFull(NeedFullReason::InterruptedImport(previous));
        }
        match target.diff_since(current, self.config.max_diff_threshold) {
            Ok(changes) => DeltaOutcome::Ready(changes),
            Err(e) => DeltaOutcome::NeedFull(NeedFullReason::Diff(e)),
        }
    }

    fn apply_delta(&self, tx: &StoreTransaction<'_>, changes: Vec<ItemChange>) -> Result<SyncOutcome> {
        let total = changes.len();
        let progress = ProgressTracker::with_total("delta catch-up", total as u64);
        let mut written = 0u64;

        for (processed, change) in changes.iter().enumerate() {
            if let Some(entry_change) = EntryChange::from_item_change(change)? {
                match &entry_change {
                    EntryChange::Created(entry) => tx.store_add(entry)?,
                    EntryChange::Updated { current, .. } => tx.store_change(current)?,
                    EntryChange::Deleted { previous } => tx.store_delete(previous)?,
                }
                written += 1;
            } else {
                trace!(index = %change.index, "Skipping change of untracked kind");
            }
            progress.inc();
            self.maybe_checkpoint(tx, processed + 1, total)?;
        }
        progress.complete();

        let mut stats = self.stats.lock();
        stats.delta_catch_ups += 1;
        stats.entries_written += written;
        Ok(SyncOutcome::Delta { changes: total })
    }

    fn import_full(&self, tx: &StoreTransaction<'_>, target: &LedgerSnapshot<T>) -> Result<SyncOutcome> {
        tx.drop_all_entry_tables()?;
        tx.recreate_entry_tables()?;

        let tree = target.tree();
        let total = tree.item_count();
        let progress = ProgressTracker::with_optional_total("full import", total);
        let mut processed = 0usize;
        let mut written = 0u64;
        let mut skipped = 0u64;

        for item in tree.items() {
            let item = item?;
            match LedgerEntry::from_tree_item(&item)? {
                Some(entry) => {
                    tx.store_add(&entry)?;
                    written += 1;
                }
                None => skipped += 1,
            }
            processed += 1;
            progress.inc();
            if processed % self.config.batch_size == 0 {
                self.checkpoint(tx, processed)?;
            }
        }
        progress.complete();
        if skipped > 0 {
            debug!(skipped, "Skipped items of untracked kinds");
        }

        let mut stats = self.stats.lock();
        stats.full_imports += 1;
        stats.entries_written += written;
        Ok(SyncOutcome::FullImport { entries: written })
    }

    fn maybe_checkpoint(&self, tx: &StoreTransaction<'_>, processed: usize, total: usize) -> Result<()> {
        if processed % self.config.batch_size == 0 && processed < total {
            self.checkpoint(tx, processed)?;
        }
        Ok(())
    }

    fn checkpoint(&self, tx: &StoreTransaction<'_>, processed: usize) -> Result<()> {
        tx.checkpoint()?;
        self.stats.lock().checkpoints += 1;
        debug!(processed, "Checkpointed catch-up");
        Ok(())
    }

    /// Applies a batch of transactions and closes the next ledger.
    ///
    /// Each transaction runs in its own savepoint. If any fails, the whole
    /// close is rolled back and nothing of the batch is visible.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSequence`] or [`LedgerError::InvalidLedgerClose`]
    ///   if `close_data` does not follow the current ledger, or an import is
    ///   still pending.
    /// - [`LedgerError::Apply`] wrapping the first failed transaction.
    pub fn close_ledger<A, F>(
        &self,
        close_data: LedgerCloseData<A::Transaction>,
        applier: &A,
        finalizer: &F,
    ) -> Result<LedgerCloseResult<T>>
    where
        A: TransactionApplier + ?Sized,
        F: TreeFinalizer<T> + ?Sized,
    {
        let _write = self.write_lock.lock();
        let tx = self.store.begin_transaction()?;
        ensure_outermost(&tx, "ledger close")?;

        let current = self.current_snapshot();
        let expected = current.ledger_seq() + 1;
        if close_data.ledger_seq != expected {
            return Err(LedgerError::InvalidSequence {
                expected,
                actual: close_data.ledger_seq,
            });
        }
        let current_hash = current.header().hash()?;
        if close_data.prev_ledger_hash != current_hash {
            return Err(LedgerError::InvalidLedgerClose(format!(
                "previous ledger hash {} does not match current {}",
                close_data.prev_ledger_hash, current_hash
            )));
        }
        if let Some(pending) = tx.with_connection(|conn| conn.get_ledger_to_import())? {
            return Err(LedgerError::InvalidLedgerClose(format!(
                "import of {} has not finished",
                pending
            )));
        }

        let tx_count = close_data.transactions.len();
        let mut delta = LedgerDelta::new();
        for (index, transaction) in close_data.transactions.iter().enumerate() {
            let savepoint = self.store.begin_transaction()?;
            let mut tx_delta = LedgerDelta::new();
            let applied = {
                let mut writer = EntryWriter::new(&savepoint, &mut tx_delta);
                applier.apply(transaction, &mut writer)
            };
            match applied {
                Ok(()) => {
                    savepoint.commit()?;
                    delta.merge(tx_delta);
                }
                Err(e) => {
                    if let Err(rollback) = savepoint.rollback() {
                        warn!(error = %rollback, "Failed to roll back transaction savepoint");
                    }
                    warn!(
                        ledger_seq = close_data.ledger_seq,
                        index,
                        error = %e,
                        "Transaction failed, abandoning ledger close"
                    );
                    return Err(LedgerError::Apply {
                        index,
                        source: Box::new(e),
                    });
                }
            }
        }

        let snapshot = finalizer.finalize(&current, &delta, close_data.close_time)?;
        if !snapshot.is_closed() {
            return Err(LedgerError::NotClosed(snapshot.root_hash()));
        }
        if snapshot.ledger_seq() != expected {
            return Err(LedgerError::InvalidLedgerClose(format!(
                "finalized ledger {} instead of {}",
                snapshot.ledger_seq(),
                expected
            )));
        }

        let header_hash = snapshot.header().hash()?;
        tx.store_ledger_header(snapshot.header())?;
        tx.set_last_closed_ledger(&LastClosedLedger {
            root_hash: snapshot.root_hash(),
            header: snapshot.header().clone(),
        })?;
        tx.commit()?;
        *self.current.write() = snapshot.clone();
        self.stats.lock().ledgers_closed += 1;

        let stats = LedgerCloseStats::from_delta(tx_count, &delta);
        info!(
            ledger_seq = snapshot.ledger_seq(),
            root = %snapshot.root_hash(),
            hash = %header_hash,
            tx_count,
            created = stats.entries_created,
            updated = stats.entries_updated,
            deleted = stats.entries_deleted,
            "Closed ledger"
        );
        Ok(LedgerCloseResult {
            snapshot,
            header_hash,
            stats,
        })
    }
}

impl<T> std::fmt::Debug for LedgerManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerManager")
            .field("config", &self.config)
            .field("stats", &*self.stats.lock())
            .finish_non_exhaustive()
    }
}

fn ensure_outermost(tx: &StoreTransaction<'_>, what: &str) -> Result<()> {
    if tx.level() != 1 {
        return Err(DbError::NestingViolation(format!(
            "{what} must own the outermost transaction, opened at level {}",
            tx.level()
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MemoryTree;
    use ledgersync_common::{AccountEntry, AccountId, LedgerHeader};

    fn account(byte: u8, balance: u64) -> LedgerEntry {
        AccountEntry::new(AccountId([byte; 20]), balance).into()
    }

    fn snapshot(entries: &[LedgerEntry], seq: u32) -> LedgerSnapshot<MemoryTree> {
        let tree = MemoryTree::from_items(entries.iter().map(|e| e.to_tree_item().unwrap()));
        let mut header = LedgerHeader::genesis();
        header.ledger_seq = seq;
        header.state_hash = tree.root_hash();
        LedgerSnapshot::closed(Arc::new(tree), header)
    }

    fn manager() -> LedgerManager<MemoryTree> {
        let store = Arc::new(LedgerStore::open_in_memory().unwrap());
        LedgerManager::new(store, LedgerManagerConfig::default())
    }

    #[test]
    fn test_config_from_sync_config() {
        let sync = SyncConfig {
            max_diff_threshold: 10,
            batch_size: 0,
            check_local_nodes: false,
        };
        let config = LedgerManagerConfig::from(&sync);
        assert_eq!(config.max_diff_threshold, 10);
        assert_eq!(config.batch_size, 1);
        assert!(!config.check_local_nodes);
    }

    #[test]
    fn test_compute_delta_paths() {
        let manager = manager();
        let genesis = LedgerSnapshot::<MemoryTree>::genesis();
        let a = snapshot(&[account(1, 1)], 1);
        let b = snapshot(&[account(1, 2)], 2);

        assert!(matches!(
            manager.compute_delta(&genesis, &a, None),
            DeltaOutcome::NeedFull(NeedFullReason::FreshNode)
        ));
        assert!(matches!(
            manager.compute_delta(&a, &b, Some(Hash256::ZERO)),
            DeltaOutcome::NeedFull(NeedFullReason::InterruptedImport(_))
        ));
        match manager.compute_delta(&a, &b, None) {
            DeltaOutcome::Ready(changes) => assert_eq!(changes.len(), 1),
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn test_ensure_sync_rejects_open_snapshot() {
        let manager = manager();
        let tree = Arc::new(MemoryTree::from_items(vec![account(1, 1).to_tree_item().unwrap()]));
        let open = LedgerSnapshot::open(tree, LedgerHeader::genesis());
        assert!(matches!(
            manager.ensure_sync(&open, true),
            Err(LedgerError::NotClosed(_))
        ));
    }

    #[test]
    fn test_ensure_sync_same_root_is_noop() {
        let manager = manager();
        let genesis = LedgerSnapshot::<MemoryTree>::genesis();
        assert_eq!(
            manager.ensure_sync(&genesis, true).unwrap(),
            SyncOutcome::AlreadySynced
        );
        assert_eq!(manager.stats(), LedgerManagerStats::default());
    }

    #[test]
    fn test_catch_up_from_genesis_imports_in_full() {
        let manager = manager();
        let target = snapshot(&[account(1, 10), account(2, 20)], 1);

        let current = manager.catch_up(&target).unwrap();
        assert_eq!(current.root_hash(), target.root_hash());
        assert_eq!(manager.stats().full_imports, 1);
        assert_eq!(manager.stats().entries_written, 2);
        assert_eq!(manager.store().ledger_to_import().unwrap(), None);
    }
}

//! Point-in-time snapshots of ledger state.
//!
//! A [`LedgerSnapshot`] pairs one immutable version of the state tree with
//! the header of the ledger that produced it. Snapshots are cheap to clone:
//! the tree is shared behind an [`Arc`].

use std::collections::HashMap;
use std::sync::Arc;

use ledgersync_common::{Hash256, LedgerHeader};
use parking_lot::RwLock;

use crate::tree::{DiffError, ItemChange, MemoryTree, StateTree};

/// One version of the full ledger state.
#[derive(Debug)]
pub struct LedgerSnapshot<T> {
    tree: Arc<T>,
    header: LedgerHeader,
    /// Root hash of the snapshot this one was closed on top of.
    parent: Option<Hash256>,
    closed: bool,
}

impl<T> Clone for LedgerSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            tree: Arc::clone(&self.tree),
            header: self.header.clone(),
            parent: self.parent,
            closed: self.closed,
        }
    }
}

impl<T: StateTree> LedgerSnapshot<T> {
    /// A closed snapshot, as delivered by the agreement protocol.
    pub fn closed(tree: Arc<T>, header: LedgerHeader) -> Self {
        Self {
            tree,
            header,
            parent: None,
            closed: true,
        }
    }

    /// A snapshot still being built. It cannot be synced to until closed.
    pub fn open(tree: Arc<T>, header: LedgerHeader) -> Self {
        Self {
            tree,
            header,
            parent: None,
            closed: false,
        }
    }

    pub fn with_parent(mut self, parent: Hash256) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Marks the snapshot immutable.
    pub fn close(mut self) -> Self {
        self.closed = true;
        self
    }

    pub fn root_hash(&self) -> Hash256 {
        self.tree.root_hash()
    }

    pub fn header(&self) -> &LedgerHeader {
        &self.header
    }

    pub fn ledger_seq(&self) -> u32 {
        self.header.ledger_seq
    }

    pub fn parent(&self) -> Option<Hash256> {
        self.parent
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn tree(&self) -> &Arc<T> {
        &self.tree
    }

    /// Items changed between `base` and this snapshot, bounded by `max_changes`.
    pub fn diff_since(
        &self,
        base: &LedgerSnapshot<T>,
        max_changes: usize,
    ) -> Result<Vec<ItemChange>, DiffError> {
        self.tree.diff_since(&base.tree, max_changes)
    }

    pub fn has_missing_nodes(&self) -> bool {
        self.tree.has_missing_nodes()
    }
}

impl<T: StateTree + Default> LedgerSnapshot<T> {
    /// The empty ledger a fresh node starts from. Its root hash is zero.
    pub fn genesis() -> Self {
        Self::closed(Arc::new(T::default()), LedgerHeader::genesis())
    }
}

/// Where the tree layer hands out snapshots by root hash.
///
/// Consulted at startup to reload the last closed ledger and to find the
/// target of an interrupted import.
pub trait SnapshotSource<T> {
    fn snapshot(&self, root: &Hash256) -> Option<LedgerSnapshot<T>>;
}

/// A [`SnapshotSource`] backed by a map of in-memory trees.
#[derive(Debug, Default)]
pub struct MemorySnapshotSource {
    snapshots: RwLock<HashMap<Hash256, LedgerSnapshot<MemoryTree>>>,
}

impl MemorySnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: LedgerSnapshot<MemoryTree>) {
        self.snapshots
            .write()
            .insert(snapshot.root_hash(), snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}

impl SnapshotSource<MemoryTree> for MemorySnapshotSource {
    fn snapshot(&self, root: &Hash256) -> Option<LedgerSnapshot<MemoryTree>> {
        self.snapshots.read().get(root).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersync_common::TreeItem;

    fn tree_with(byte: u8) -> Arc<MemoryTree> {
        Arc::new(MemoryTree::from_items(vec![TreeItem::with_tag(
            Hash256::from_bytes([byte; 32]),
            0x0061,
            b"payload",
        )]))
    }

    #[test]
    fn test_genesis_is_closed_and_empty() {
        let genesis = LedgerSnapshot::<MemoryTree>::genesis();
        assert!(genesis.is_closed());
        assert!(genesis.root_hash().is_zero());
        assert_eq!(genesis.ledger_seq(), 0);
        assert!(genesis.parent().is_none());
    }

    #[test]
    fn test_open_snapshot_closes() {
        let snapshot = LedgerSnapshot::open(tree_with(1), LedgerHeader::genesis());
        assert!(!snapshot.is_closed());
        let snapshot = snapshot.with_parent(Hash256::ZERO).close();
        assert!(snapshot.is_closed());
        assert_eq!(snapshot.parent(), Some(Hash256::ZERO));
    }

    #[test]
    fn test_clone_shares_tree() {
        let snapshot = LedgerSnapshot::closed(tree_with(1), LedgerHeader::genesis());
        let copy = snapshot.clone();
        assert!(Arc::ptr_eq(snapshot.tree(), copy.tree()));
    }

    #[test]
    fn test_diff_between_snapshots() {
        let base = LedgerSnapshot::closed(tree_with(1), LedgerHeader::genesis());
        let target = LedgerSnapshot::closed(tree_with(2), LedgerHeader::genesis());
        let changes = target.diff_since(&base, 10).unwrap();
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn test_memory_source_lookup() {
        let source = MemorySnapshotSource::new();
        let snapshot = LedgerSnapshot::closed(tree_with(3), LedgerHeader::genesis());
        let root = snapshot.root_hash();
        source.insert(snapshot);
        assert_eq!(source.len(), 1);
        assert_eq!(source.snapshot(&root).unwrap().root_hash(), root);
        assert!(source.snapshot(&Hash256::ZERO).is_none());
    }
}

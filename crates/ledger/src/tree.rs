//! The state tree contract and an in-memory reference tree.
//!
//! The synchronization engine never looks at tree nodes. It needs four
//! things from a tree: its root hash, a bounded diff against an older tree,
//! iteration over every item, and whether any nodes are missing locally.
//! [`StateTree`] captures exactly that.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use ledgersync_common::{Hash256, TreeItem};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Failure while walking a tree.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TreeError(pub String);

/// Why a diff could not be produced.
///
/// Neither case is fatal: the caller falls back to importing the target in
/// full.
#[derive(Debug, Clone, Error)]
pub enum DiffError {
    /// More items differ than the caller is willing to apply incrementally.
    #[error("diff exceeds {limit} changes")]
    ThresholdExceeded { limit: usize },

    /// The walk itself failed.
    #[error("diff traversal failed: {0}")]
    Traversal(#[from] TreeError),
}

/// One differing index between two trees.
///
/// At least one side is present. Both present means changed, only `new`
/// means added, only `old` means deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemChange {
    pub index: Hash256,
    pub new: Option<TreeItem>,
    pub old: Option<TreeItem>,
}

/// Iterator over every item of a tree, in index order.
pub type TreeItems<'a> = Box<dyn Iterator<Item = Result<TreeItem, TreeError>> + 'a>;

/// Read access to one immutable version of the state tree.
pub trait StateTree: Send + Sync {
    /// Root hash; zero for the empty tree.
    fn root_hash(&self) -> Hash256;

    /// Items that differ between `base` and `self`.
    ///
    /// Must fail with [`DiffError::ThresholdExceeded`] rather than return
    /// more than `max_changes` items.
    fn diff_since(&self, base: &Self, max_changes: usize) -> Result<Vec<ItemChange>, DiffError>
    where
        Self: Sized;

    fn items(&self) -> TreeItems<'_>;

    /// Number of items, when cheaply known. Used for progress reporting.
    fn item_count(&self) -> Option<u64> {
        None
    }

    /// Whether some nodes of this tree are not available locally.
    fn has_missing_nodes(&self) -> bool;
}

/// Root hash of an ordered item map.
///
/// SHA-256 over the concatenated `(index, SHA-256(data))` pairs, or zero for
/// an empty map.
pub fn compute_root<'a>(items: impl IntoIterator<Item = (&'a Hash256, &'a Vec<u8>)>) -> Hash256 {
    let mut hasher = Sha256::new();
    let mut any = false;
    for (index, data) in items {
        any = true;
        hasher.update(index.as_bytes());
        hasher.update(Sha256::digest(data));
    }
    if !any {
        return Hash256::ZERO;
    }
    let digest: [u8; 32] = hasher.finalize().into();
    Hash256::from_bytes(digest)
}

/// A state tree held entirely in memory, ordered by index.
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    items: BTreeMap<Hash256, Vec<u8>>,
    root: Hash256,
    missing_nodes: bool,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = TreeItem>) -> Self {
        let mut tree = Self::default();
        tree.items
            .extend(items.into_iter().map(|item| (item.index, item.data)));
        tree.rehash();
        tree
    }

    /// Inserts or replaces an item.
    pub fn insert(&mut self, item: TreeItem) {
        self.items.insert(item.index, item.data);
        self.rehash();
    }

    pub fn remove(&mut self, index: &Hash256) -> Option<TreeItem> {
        let data = self.items.remove(index)?;
        self.rehash();
        Some(TreeItem::new(*index, data))
    }

    pub fn get(&self, index: &Hash256) -> Option<TreeItem> {
        self.items
            .get(index)
            .map(|data| TreeItem::new(*index, data.clone()))
    }

    /// Applies a batch of upserts and removals, rehashing once.
    pub fn apply(
        &mut self,
        upserts: impl IntoIterator<Item = TreeItem>,
        removals: impl IntoIterator<Item = Hash256>,
    ) {
        for item in upserts {
            self.items.insert(item.index, item.data);
        }
        for index in removals {
            self.items.remove(&index);
        }
        self.rehash();
    }

    /// Marks the tree as incomplete, as if some nodes had not been fetched.
    pub fn set_missing_nodes(&mut self, missing: bool) {
        self.missing_nodes = missing;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn rehash(&mut self) {
        self.root = compute_root(&self.items);
    }
}

impl StateTree for MemoryTree {
    fn root_hash(&self) -> Hash256 {
        self.root
    }

    fn diff_since(&self, base: &Self, max_changes: usize) -> Result<Vec<ItemChange>, DiffError> {
        if self.missing_nodes || base.missing_nodes {
            return Err(TreeError("tree has missing nodes".to_string()).into());
        }

        let mut changes = Vec::new();
        let mut push = |change: ItemChange| {
            if changes.len() == max_changes {
                return Err(DiffError::ThresholdExceeded { limit: max_changes });
            }
            changes.push(change);
            Ok(())
        };

        let mut new_iter = self.items.iter().peekable();
        let mut old_iter = base.items.iter().peekable();
        loop {
            let order = match (new_iter.peek(), old_iter.peek()) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some((new_index, _)), Some((old_index, _))) => new_index.cmp(old_index),
            };
            match order {
                Ordering::Less => {
                    if let Some((index, data)) = new_iter.next() {
                        push(ItemChange {
                            index: *index,
                            new: Some(TreeItem::new(*index, data.clone())),
                            old: None,
                        })?;
                    }
                }
                Ordering::Greater => {
                    if let Some((index, data)) = old_iter.next() {
                        push(ItemChange {
                            index: *index,
                            new: None,
                            old: Some(TreeItem::new(*index, data.clone())),
                        })?;
                    }
                }
                Ordering::Equal => {
                    if let (Some((index, new_data)), Some((_, old_data))) =
                        (new_iter.next(), old_iter.next())
                    {
                        if new_data != old_data {
                            push(ItemChange {
                                index: *index,
                                new: Some(TreeItem::new(*index, new_data.clone())),
                                old: Some(TreeItem::new(*index, old_data.clone())),
                            })?;
                        }
                    }
                }
            }
        }
        Ok(changes)
    }

    fn items(&self) -> TreeItems<'_> {
        if self.missing_nodes {
            return Box::new(std::iter::once(Err(TreeError(
                "tree has missing nodes".to_string(),
            ))));
        }
        Box::new(
            self.items
                .iter()
                .map(|(index, data)| Ok(TreeItem::new(*index, data.clone()))),
        )
    }

    fn item_count(&self) -> Option<u64> {
        Some(self.items.len() as u64)
    }

    fn has_missing_nodes(&self) -> bool {
        self.missing_nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(byte: u8, payload: &[u8]) -> TreeItem {
        TreeItem::with_tag(Hash256::from_bytes([byte; 32]), 0x0061, payload)
    }

    #[test]
    fn test_empty_tree_has_zero_root() {
        assert_eq!(MemoryTree::new().root_hash(), Hash256::ZERO);
        assert!(MemoryTree::from_items(Vec::new()).root_hash().is_zero());
    }

    #[test]
    fn test_root_is_order_independent_and_content_sensitive() {
        let a = MemoryTree::from_items(vec![item(1, b"x"), item(2, b"y")]);
        let b = MemoryTree::from_items(vec![item(2, b"y"), item(1, b"x")]);
        let c = MemoryTree::from_items(vec![item(1, b"x"), item(2, b"z")]);
        assert_eq!(a.root_hash(), b.root_hash());
        assert_ne!(a.root_hash(), c.root_hash());
        assert!(!a.root_hash().is_zero());
    }

    #[test]
    fn test_insert_and_remove_track_root() {
        let mut tree = MemoryTree::from_items(vec![item(1, b"x")]);
        let before = tree.root_hash();
        tree.insert(item(2, b"y"));
        assert_ne!(tree.root_hash(), before);
        assert!(tree.remove(&Hash256::from_bytes([2; 32])).is_some());
        assert_eq!(tree.root_hash(), before);
        assert!(tree.remove(&Hash256::from_bytes([2; 32])).is_none());
    }

    #[test]
    fn test_diff_classifies_changes() {
        let base = MemoryTree::from_items(vec![item(1, b"a"), item(2, b"b"), item(3, b"c")]);
        let target = MemoryTree::from_items(vec![item(1, b"a"), item(2, b"B"), item(4, b"d")]);

        let changes = target.diff_since(&base, 10).unwrap();
        assert_eq!(changes.len(), 3);

        let changed = &changes[0];
        assert_eq!(changed.index, Hash256::from_bytes([2; 32]));
        assert!(changed.new.is_some() && changed.old.is_some());

        let deleted = &changes[1];
        assert_eq!(deleted.index, Hash256::from_bytes([3; 32]));
        assert!(deleted.new.is_none() && deleted.old.is_some());

        let added = &changes[2];
        assert_eq!(added.index, Hash256::from_bytes([4; 32]));
        assert!(added.new.is_some() && added.old.is_none());
    }

    #[test]
    fn test_diff_refuses_to_exceed_threshold() {
        let base = MemoryTree::new();
        let target = MemoryTree::from_items((1..=5).map(|b| item(b, b"v")));

        assert_eq!(target.diff_since(&base, 5).unwrap().len(), 5);
        assert!(matches!(
            target.diff_since(&base, 4),
            Err(DiffError::ThresholdExceeded { limit: 4 })
        ));
    }

    #[test]
    fn test_missing_nodes_block_diff_and_iteration() {
        let base = MemoryTree::from_items(vec![item(1, b"a")]);
        let mut target = MemoryTree::from_items(vec![item(1, b"b")]);
        target.set_missing_nodes(true);

        assert!(target.has_missing_nodes());
        assert!(matches!(
            target.diff_since(&base, 10),
            Err(DiffError::Traversal(_))
        ));
        assert!(target.items().next().unwrap().is_err());
    }

    #[test]
    fn test_items_iterate_in_index_order() {
        let tree = MemoryTree::from_items(vec![item(3, b"c"), item(1, b"a"), item(2, b"b")]);
        let indexes: Vec<u8> = tree
            .items()
            .map(|item| item.unwrap().index.as_bytes()[0])
            .collect();
        assert_eq!(indexes, vec![1, 2, 3]);
        assert_eq!(tree.item_count(), Some(3));
    }
}

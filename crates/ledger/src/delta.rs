//! Entry-level change tracking.
//!
//! Two producers feed this module:
//!
//! - **Catch-up**: each [`ItemChange`] of a tree diff is classified into an
//!   [`EntryChange`] by [`EntryChange::from_item_change`].
//! - **Ledger close**: transaction application records its writes into a
//!   [`LedgerDelta`], which coalesces repeated changes to the same entry.
//!
//! # Change Coalescing
//!
//! - Create + Update = Create (with final value)
//! - Create + Delete = No change
//! - Update + Update = Update (original previous, final current)
//! - Update + Delete = Delete (original previous)
//! - Delete + Create = Update (original previous, new current)

use std::collections::HashMap;

use ledgersync_common::{Hash256, LedgerEntry};

use crate::tree::ItemChange;
use crate::Result;

/// A single change to a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryChange {
    /// The entry did not exist in the previous state.
    Created(LedgerEntry),
    /// The entry existed and was modified.
    Updated {
        previous: LedgerEntry,
        current: Box<LedgerEntry>,
    },
    /// The entry existed and is gone.
    Deleted { previous: LedgerEntry },
}

impl EntryChange {
    /// Classifies one diff tuple.
    ///
    /// Returns `Ok(None)` when neither side is a kind the projection tracks.
    ///
    /// # Errors
    ///
    /// Fails if either side is a known kind that does not decode.
    pub fn from_item_change(change: &ItemChange) -> Result<Option<Self>> {
        let current = change
            .new
            .as_ref()
            .map(LedgerEntry::from_tree_item)
            .transpose()?
            .flatten();
        let previous = change
            .old
            .as_ref()
            .map(LedgerEntry::from_tree_item)
            .transpose()?
            .flatten();

        Ok(match (current, previous) {
            (Some(current), Some(previous)) => Some(EntryChange::Updated {
                previous,
                current: Box::new(current),
            }),
            (Some(current), None) => Some(EntryChange::Created(current)),
            (None, Some(previous)) => Some(EntryChange::Deleted { previous }),
            (None, None) => None,
        })
    }

    /// Content address of the changed entry.
    pub fn index(&self) -> Hash256 {
        match self {
            EntryChange::Created(entry) => entry.index(),
            EntryChange::Updated { current, .. } => current.index(),
            EntryChange::Deleted { previous } => previous.index(),
        }
    }

    pub fn current_entry(&self) -> Option<&LedgerEntry> {
        match self {
            EntryChange::Created(entry) => Some(entry),
            EntryChange::Updated { current, .. } => Some(current.as_ref()),
            EntryChange::Deleted { .. } => None,
        }
    }

    pub fn previous_entry(&self) -> Option<&LedgerEntry> {
        match self {
            EntryChange::Created(_) => None,
            EntryChange::Updated { previous, .. } => Some(previous),
            EntryChange::Deleted { previous } => Some(previous),
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, EntryChange::Created(_))
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, EntryChange::Updated { .. })
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, EntryChange::Deleted { .. })
    }
}

/// Accumulates the entry changes of one ledger close.
///
/// Changes are kept in first-recorded order so the tree layer sees a
/// deterministic sequence.
#[derive(Debug, Default)]
pub struct LedgerDelta {
    changes: HashMap<Hash256, EntryChange>,
    change_order: Vec<Hash256>,
    /// Net change to the fee pool (positive = fees collected).
    fee_pool_delta: i64,
}

impl LedgerDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the creation of an entry.
    pub fn record_create(&mut self, entry: LedgerEntry) {
        let key = entry.index();
        let change = match self.changes.remove(&key) {
            None => {
                self.change_order.push(key);
                EntryChange::Created(entry)
            }
            Some(EntryChange::Created(_)) => EntryChange::Created(entry),
            Some(EntryChange::Updated { previous, .. })
            | Some(EntryChange::Deleted { previous }) => EntryChange::Updated {
                previous,
                current: Box::new(entry),
            },
        };
        self.changes.insert(key, change);
    }

    /// Records an update of an existing entry.
    pub fn record_update(&mut self, previous: LedgerEntry, current: LedgerEntry) {
        let key = current.index();
        let change = match self.changes.remove(&key) {
            None => {
                self.change_order.push(key);
                EntryChange::Updated {
                    previous,
                    current: Box::new(current),
                }
            }
            Some(EntryChange::Created(_)) => EntryChange::Created(current),
            Some(EntryChange::Updated { previous, .. })
            | Some(EntryChange::Deleted { previous }) => EntryChange::Updated {
                previous,
                current: Box::new(current),
            },
        };
        self.changes.insert(key, change);
    }

    /// Records the deletion of an entry.
    pub fn record_delete(&mut self, entry: LedgerEntry) {
        let key = entry.index();
        match self.changes.remove(&key) {
            None => {
                self.change_order.push(key);
                self.changes
                    .insert(key, EntryChange::Deleted { previous: entry });
            }
            Some(EntryChange::Created(_)) => {
                self.change_order.retain(|k| k != &key);
            }
            Some(EntryChange::Updated { previous, .. }) => {
                self.changes.insert(key, EntryChange::Deleted { previous });
            }
            Some(deleted @ EntryChange::Deleted { .. }) => {
                self.changes.insert(key, deleted);
            }
        }
    }

    pub fn record_fee_pool_delta(&mut self, delta: i64) {
        self.fee_pool_delta += delta;
    }

    pub fn fee_pool_delta(&self) -> i64 {
        self.fee_pool_delta
    }

    /// Changes in the order they were first recorded.
    pub fn changes(&self) -> impl Iterator<Item = &EntryChange> {
        self.change_order
            .iter()
            .filter_map(move |key| self.changes.get(key))
    }

    pub fn num_changes(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.fee_pool_delta == 0
    }

    /// Folds the changes of a later delta into this one.
    pub fn merge(&mut self, other: LedgerDelta) {
        let LedgerDelta {
            mut changes,
            change_order,
            fee_pool_delta,
        } = other;
        for key in change_order {
            match changes.remove(&key) {
                Some(EntryChange::Created(entry)) => self.record_create(entry),
                Some(EntryChange::Updated { previous, current }) => {
                    self.record_update(previous, *current)
                }
                Some(EntryChange::Deleted { previous }) => self.record_delete(previous),
                None => {}
            }
        }
        self.fee_pool_delta += fee_pool_delta;
    }
}

//! The single-writer ledger store.
//!
//! [`LedgerStore`] owns the one connection allowed to mutate the database.
//! A writer opens a [`StoreTransaction`] with
//! [`begin_transaction`](LedgerStore::begin_transaction); a second call on
//! the same thread nests a savepoint inside it. Nesting stops at two levels.
//!
//! ```text
//! depth 0 --begin--> depth 1 (BEGIN IMMEDIATE)
//! depth 1 --begin--> depth 2 (SAVEPOINT nested)
//! depth 2 --begin--> NestingViolation
//! ```
//!
//! The writer lock is re-entrant and held for as long as any level is open,
//! so other threads block in `begin_transaction` until the outermost level
//! ends. Readers never take it: they read the last committed state through
//! their own pooled connections.

use std::cell::RefCell;

use ledgersync_common::{Hash256, LastClosedLedger, LedgerEntry, LedgerHeader};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use rusqlite::Connection;
use tracing::{debug, trace, warn};

use crate::error::DbError;
use crate::pool::{Database, PooledConnection};
use crate::queries::{EntryQueries, LedgerQueries, StateQueries};
use crate::schema::{CREATE_ENTRY_TABLES, DROP_ENTRY_TABLES};

/// Deepest nesting level of writer transactions.
pub const MAX_TRANSACTION_DEPTH: u8 = 2;

const SAVEPOINT_NAME: &str = "nested";

#[derive(Default)]
struct Writer {
    conn: Option<PooledConnection>,
    depth: u8,
}

/// Relational store of the entry projection and its markers.
pub struct LedgerStore {
    db: Database,
    writer: ReentrantMutex<RefCell<Writer>>,
}

impl LedgerStore {
    /// Wraps an opened database.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            writer: ReentrantMutex::new(RefCell::new(Writer::default())),
        }
    }

    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, DbError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Opens a writer transaction, or a nested savepoint if this thread
    /// already has one open.
    ///
    /// Blocks while another thread holds the writer.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NestingViolation`] if two levels are already open.
    pub fn begin_transaction(&self) -> Result<StoreTransaction<'_>, DbError> {
        let guard = self.writer.lock();
        let level = {
            let mut writer = guard.borrow_mut();
            match writer.depth {
                0 => {
                    let conn = self.db.connection()?;
                    conn.execute_batch("BEGIN IMMEDIATE")?;
                    writer.conn = Some(conn);
                    writer.depth = 1;
                }
                1 => {
                    let conn = writer.conn.as_ref().ok_or_else(writer_lost)?;
                    conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT_NAME}"))?;
                    writer.depth = 2;
                }
                depth => {
                    return Err(DbError::NestingViolation(format!(
                        "cannot open level {} (maximum {})",
                        depth + 1,
                        MAX_TRANSACTION_DEPTH
                    )));
                }
            }
            writer.depth
        };
        trace!(level, "Began store transaction");
        Ok(StoreTransaction {
            guard,
            level,
            finished: false,
        })
    }

    /// Depth of the writer transaction open on this thread, zero if none.
    ///
    /// Returns zero while another thread holds the writer.
    pub fn transaction_level(&self) -> u8 {
        match self.writer.try_lock() {
            Some(guard) => guard.borrow().depth,
            None => 0,
        }
    }

    /// Runs `f` on the connection that sees this thread's view.
    ///
    /// Inside an open writer transaction that is the writer's connection, so
    /// uncommitted writes are visible. Otherwise a pooled reader connection
    /// sees the last committed state.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError>,
    {
        if let Some(guard) = self.writer.try_lock() {
            let writer = guard.borrow();
            if let Some(conn) = writer.conn.as_ref() {
                return f(conn);
            }
        }
        self.db.with_connection(f)
    }

    /// Reads a marker. Absent markers read as `None`.
    pub fn get_marker(&self, key: &str) -> Result<Option<Vec<u8>>, DbError> {
        self.with_connection(|conn| conn.get_state(key))
    }

    /// Writes a marker in its own transaction (or the open one).
    pub fn set_marker(&self, key: &str, value: &[u8]) -> Result<(), DbError> {
        let tx = self.begin_transaction()?;
        tx.with_connection(|conn| conn.set_state(key, value))?;
        tx.commit()
    }

    pub fn last_closed_ledger(&self) -> Result<Option<LastClosedLedger>, DbError> {
        self.with_connection(|conn| conn.get_last_closed_ledger())
    }

    pub fn ledger_to_import(&self) -> Result<Option<Hash256>, DbError> {
        self.with_connection(|conn| conn.get_ledger_to_import())
    }
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore")
            .field("db", &self.db)
            .field("transaction_level", &self.transaction_level())
            .finish()
    }
}

fn writer_lost() -> DbError {
    DbError::NestingViolation("writer connection missing for open transaction".to_string())
}

/// One open level of the writer transaction.
///
/// Dropping an unfinished level rolls it back. Dropping the outer level
/// while the inner one is still open rolls back both.
pub struct StoreTransaction<'a> {
    guard: ReentrantMutexGuard<'a, RefCell<Writer>>,
    level: u8,
    finished: bool,
}

impl<'a> StoreTransaction<'a> {
    /// Nesting level of this transaction: 1 for the outer transaction,
    /// 2 for a savepoint.
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn commit(self) -> Result<(), DbError> {
        self.end(true)
    }

    pub fn rollback(self) -> Result<(), DbError> {
        self.end(false)
    }

    /// Ends this level, committing or rolling back.
    ///
    /// Committing the inner level folds its writes into the outer one.
    /// Committing the outer level makes everything durable.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NestingViolation`] if this is not the innermost
    /// open level. The transaction is then rolled back when dropped.
    pub fn end(mut self, commit: bool) -> Result<(), DbError> {
        let mut writer = self.guard.borrow_mut();
        if writer.depth != self.level {
            return Err(DbError::NestingViolation(format!(
                "ending level {} while level {} is open",
                self.level, writer.depth
            )));
        }

        let sql = match (self.level, commit) {
            (1, true) => "COMMIT".to_string(),
            (1, false) => "ROLLBACK".to_string(),
            (_, true) => format!("RELEASE {SAVEPOINT_NAME}"),
            (_, false) => format!("ROLLBACK TO {SAVEPOINT_NAME}; RELEASE {SAVEPOINT_NAME}"),
        };
        let conn = writer.conn.as_ref().ok_or_else(writer_lost)?;
        conn.execute_batch(&sql)?;

        writer.depth -= 1;
        if writer.depth == 0 {
            writer.conn = None;
        }
        drop(writer);
        self.finished = true;
        trace!(level = self.level, commit, "Ended store transaction");
        Ok(())
    }

    /// Commits the work so far and immediately opens a fresh outer
    /// transaction, so a long import survives a crash in batches.
    ///
    /// # Errors
    ///
    /// Only the outer level may checkpoint, and only while no savepoint is
    /// open.
    pub fn checkpoint(&self) -> Result<(), DbError> {
        let writer = self.guard.borrow();
        if self.level != 1 || writer.depth != 1 {
            return Err(DbError::NestingViolation(format!(
                "checkpoint at level {} with depth {}",
                self.level, writer.depth
            )));
        }
        let conn = writer.conn.as_ref().ok_or_else(writer_lost)?;
        conn.execute_batch("COMMIT; BEGIN IMMEDIATE")?;
        debug!("Store checkpoint committed");
        Ok(())
    }

    /// Runs `f` on the writer connection.
    ///
    /// `f` must not begin or end transactions on the same store.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError>,
    {
        let writer = self.guard.borrow();
        if writer.depth < self.level {
            return Err(DbError::NestingViolation(format!(
                "level {} used after the outer transaction ended",
                self.level
            )));
        }
        let conn = writer.conn.as_ref().ok_or_else(writer_lost)?;
        f(conn)
    }

    pub fn store_add(&self, entry: &LedgerEntry) -> Result<(), DbError> {
        self.with_connection(|conn| conn.store_add(entry))
    }

    pub fn store_change(&self, entry: &LedgerEntry) -> Result<(), DbError> {
        self.with_connection(|conn| conn.store_change(entry))
    }

    pub fn store_delete(&self, entry: &LedgerEntry) -> Result<(), DbError> {
        self.with_connection(|conn| conn.store_delete(entry))
    }

    pub fn store_ledger_header(&self, header: &LedgerHeader) -> Result<(), DbError> {
        self.with_connection(|conn| conn.store_ledger_header(header))
    }

    pub fn get_marker(&self, key: &str) -> Result<Option<Vec<u8>>, DbError> {
        self.with_connection(|conn| conn.get_state(key))
    }

    pub fn set_marker(&self, key: &str, value: &[u8]) -> Result<(), DbError> {
        self.with_connection(|conn| conn.set_state(key, value))
    }

    pub fn set_last_closed_ledger(&self, marker: &LastClosedLedger) -> Result<(), DbError> {
        self.with_connection(|conn| conn.set_last_closed_ledger(marker))
    }

    pub fn set_ledger_to_import(&self, root: &Hash256) -> Result<(), DbError> {
        self.with_connection(|conn| conn.set_ledger_to_import(root))
    }

    pub fn clear_ledger_to_import(&self) -> Result<(), DbError> {
        self.with_connection(|conn| conn.clear_ledger_to_import())
    }

    /// Drops the accounts, trust lines and offers tables.
    pub fn drop_all_entry_tables(&self) -> Result<(), DbError> {
        self.with_connection(|conn| Ok(conn.execute_batch(DROP_ENTRY_TABLES)?))
    }

    /// Creates the entry tables and their indexes. Existing tables are kept.
    pub fn recreate_entry_tables(&self) -> Result<(), DbError> {
        self.with_connection(|conn| Ok(conn.execute_batch(CREATE_ENTRY_TABLES)?))
    }
}

impl Drop for StoreTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut writer = self.guard.borrow_mut();
        if writer.depth < self.level {
            return;
        }
        let Some(conn) = writer.conn.as_ref() else {
            return;
        };

        let result = if self.level == 1 {
            conn.execute_batch("ROLLBACK")
        } else {
            conn.execute_batch(&format!(
                "ROLLBACK TO {SAVEPOINT_NAME}; RELEASE {SAVEPOINT_NAME}"
            ))
        };
        if let Err(e) = result {
            warn!(level = self.level, error = %e, "Failed to roll back store transaction");
        }

        writer.depth = self.level - 1;
        if writer.depth == 0 {
            writer.conn = None;
        }
        debug!(level = self.level, "Rolled back unfinished store transaction");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::AccountQueries;
    use crate::schema::state_keys;
    use ledgersync_common::{AccountEntry, AccountId};
    use std::sync::Arc;

    fn account(byte: u8, balance: u64) -> LedgerEntry {
        AccountEntry::new(AccountId([byte; 20]), balance).into()
    }

    fn count_accounts(store: &LedgerStore) -> u64 {
        store.with_connection(|conn| conn.count_accounts()).unwrap()
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let store = LedgerStore::open_in_memory().unwrap();
        assert_eq!(store.transaction_level(), 0);

        let outer = store.begin_transaction().unwrap();
        assert_eq!(outer.level(), 1);
        let inner = store.begin_transaction().unwrap();
        assert_eq!(inner.level(), 2);
        assert_eq!(store.transaction_level(), 2);

        assert!(matches!(
            store.begin_transaction(),
            Err(DbError::NestingViolation(_))
        ));

        inner.commit().unwrap();
        outer.commit().unwrap();
        assert_eq!(store.transaction_level(), 0);
    }

    #[test]
    fn test_inner_rollback_keeps_outer_work() {
        let store = LedgerStore::open_in_memory().unwrap();
        let outer = store.begin_transaction().unwrap();
        outer.store_add(&account(1, 10)).unwrap();

        let inner = store.begin_transaction().unwrap();
        inner.store_add(&account(2, 20)).unwrap();
        assert_eq!(count_accounts(&store), 2);
        inner.rollback().unwrap();

        outer.commit().unwrap();
        assert_eq!(count_accounts(&store), 1);
    }

    #[test]
    fn test_outer_rollback_discards_committed_inner() {
        let store = LedgerStore::open_in_memory().unwrap();
        let outer = store.begin_transaction().unwrap();
        let inner = store.begin_transaction().unwrap();
        inner.store_add(&account(1, 10)).unwrap();
        inner.commit().unwrap();
        outer.rollback().unwrap();
        assert_eq!(count_accounts(&store), 0);
    }

    #[test]
    fn test_ending_outer_while_inner_open_is_violation() {
        let store = LedgerStore::open_in_memory().unwrap();
        let outer = store.begin_transaction().unwrap();
        let inner = store.begin_transaction().unwrap();
        inner.store_add(&account(1, 10)).unwrap();

        assert!(matches!(
            outer.commit(),
            Err(DbError::NestingViolation(_))
        ));
        // The failed end dropped the outer level, which rolled back both.
        assert_eq!(store.transaction_level(), 0);
        assert!(matches!(
            inner.store_add(&account(2, 10)),
            Err(DbError::NestingViolation(_))
        ));
        drop(inner);
        assert_eq!(count_accounts(&store), 0);
    }

    #[test]
    fn test_drop_rolls_back() {
        let store = LedgerStore::open_in_memory().unwrap();
        {
            let tx = store.begin_transaction().unwrap();
            tx.store_add(&account(1, 10)).unwrap();
        }
        assert_eq!(store.transaction_level(), 0);
        assert_eq!(count_accounts(&store), 0);
    }

    #[test]
    fn test_checkpoint_only_at_outer_level() {
        let store = LedgerStore::open_in_memory().unwrap();
        let outer = store.begin_transaction().unwrap();
        outer.store_add(&account(1, 10)).unwrap();
        outer.checkpoint().unwrap();
        outer.store_add(&account(2, 10)).unwrap();

        let inner = store.begin_transaction().unwrap();
        assert!(outer.checkpoint().is_err());
        assert!(inner.checkpoint().is_err());
        inner.commit().unwrap();

        outer.rollback().unwrap();
        // Work before the checkpoint survived the rollback.
        assert_eq!(count_accounts(&store), 1);
    }

    #[test]
    fn test_markers_round_trip() {
        let store = LedgerStore::open_in_memory().unwrap();
        assert!(store.get_marker("missing").unwrap().is_none());
        store.set_marker("custom", b"\x00\x01").unwrap();
        assert_eq!(store.get_marker("custom").unwrap(), Some(vec![0, 1]));

        let root = Hash256::hash(b"target");
        let tx = store.begin_transaction().unwrap();
        tx.set_ledger_to_import(&root).unwrap();
        tx.commit().unwrap();
        assert_eq!(store.ledger_to_import().unwrap(), Some(root));

        let tx = store.begin_transaction().unwrap();
        tx.clear_ledger_to_import().unwrap();
        tx.commit().unwrap();
        assert_eq!(store.ledger_to_import().unwrap(), None);
        assert_eq!(
            store.get_marker(state_keys::LEDGER_TO_IMPORT).unwrap(),
            Some(Vec::new())
        );
    }

    #[test]
    fn test_drop_and_recreate_entry_tables() {
        let store = LedgerStore::open_in_memory().unwrap();
        let tx = store.begin_transaction().unwrap();
        tx.store_add(&account(1, 10)).unwrap();
        tx.drop_all_entry_tables().unwrap();
        tx.recreate_entry_tables().unwrap();
        tx.commit().unwrap();
        assert_eq!(count_accounts(&store), 0);
    }

    #[test]
    fn test_readers_see_committed_state_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LedgerStore::open(dir.path().join("ledger.db")).unwrap());

        let tx = store.begin_transaction().unwrap();
        tx.store_add(&account(1, 10)).unwrap();

        let reader = Arc::clone(&store);
        let seen = std::thread::spawn(move || count_accounts(&reader))
            .join()
            .unwrap();
        assert_eq!(seen, 0);

        tx.commit().unwrap();
        let reader = Arc::clone(&store);
        let seen = std::thread::spawn(move || count_accounts(&reader))
            .join()
            .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_writer_lock_serializes_threads() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LedgerStore::open(dir.path().join("ledger.db")).unwrap());

        let handles: Vec<_> = (0..4u8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let tx = store.begin_transaction().unwrap();
                    assert_eq!(tx.level(), 1);
                    tx.store_add(&account(i, u64::from(i))).unwrap();
                    tx.commit().unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(count_accounts(&store), 4);
    }
}

//! State queries for the storestate table.
//!
//! Markers are opaque byte strings. The two the engine depends on are
//! `lastClosedLedger` (root hash followed by the encoded header) and
//! `ledgerToImport` (a 32-byte root hash, or empty when no import is in
//! flight). See [`state_keys`].

use ledgersync_common::{Hash256, LastClosedLedger};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::DbError;
use crate::schema::state_keys;

/// Query trait for the storestate key-value table.
pub trait StateQueries {
    /// Retrieves a state value by key.
    ///
    /// Returns `None` if the key does not exist.
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, DbError>;

    /// Stores a state value, replacing any existing one.
    fn set_state(&self, key: &str, value: &[u8]) -> Result<(), DbError>;

    /// Deletes a state value. No-op if absent.
    fn delete_state(&self, key: &str) -> Result<(), DbError>;

    /// Returns the decoded `lastClosedLedger` marker.
    fn get_last_closed_ledger(&self) -> Result<Option<LastClosedLedger>, DbError>;

    fn set_last_closed_ledger(&self, marker: &LastClosedLedger) -> Result<(), DbError>;

    /// Returns the target of an interrupted import, if any.
    ///
    /// An empty marker reads as `None`.
    fn get_ledger_to_import(&self) -> Result<Option<Hash256>, DbError>;

    fn set_ledger_to_import(&self, root: &Hash256) -> Result<(), DbError>;

    /// Empties the `ledgerToImport` marker.
    fn clear_ledger_to_import(&self) -> Result<(), DbError>;
}

impl StateQueries for Connection {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, DbError> {
        let result = self
            .query_row(
                "SELECT state FROM storestate WHERE statename = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    fn set_state(&self, key: &str, value: &[u8]) -> Result<(), DbError> {
        self.execute(
            "INSERT OR REPLACE INTO storestate (statename, state) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete_state(&self, key: &str) -> Result<(), DbError> {
        self.execute("DELETE FROM storestate WHERE statename = ?1", params![key])?;
        Ok(())
    }

    fn get_last_closed_ledger(&self) -> Result<Option<LastClosedLedger>, DbError> {
        match self.get_state(state_keys::LAST_CLOSED_LEDGER)? {
            Some(bytes) if !bytes.is_empty() => {
                let marker = LastClosedLedger::from_bytes(&bytes).map_err(|e| {
                    DbError::Integrity(format!("Invalid last closed ledger value: {}", e))
                })?;
                Ok(Some(marker))
            }
            _ => Ok(None),
        }
    }

    fn set_last_closed_ledger(&self, marker: &LastClosedLedger) -> Result<(), DbError> {
        self.set_state(state_keys::LAST_CLOSED_LEDGER, &marker.to_bytes()?)
    }

    fn get_ledger_to_import(&self) -> Result<Option<Hash256>, DbError> {
        match self.get_state(state_keys::LEDGER_TO_IMPORT)? {
            Some(bytes) if !bytes.is_empty() => {
                let root = Hash256::from_slice(&bytes).ok_or_else(|| {
                    DbError::Integrity(format!(
                        "ledgerToImport holds {} bytes, expected 32",
                        bytes.len()
                    ))
                })?;
                Ok(Some(root))
            }
            _ => Ok(None),
        }
    }

    fn set_ledger_to_import(&self, root: &Hash256) -> Result<(), DbError> {
        self.set_state(state_keys::LEDGER_TO_IMPORT, root.as_bytes())
    }

    fn clear_ledger_to_import(&self) -> Result<(), DbError> {
        self.set_state(state_keys::LEDGER_TO_IMPORT, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersync_common::LedgerHeader;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE storestate (statename TEXT PRIMARY KEY, state BLOB NOT NULL);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_get_set_state() {
        let conn = setup_db();
        assert!(conn.get_state("test_key").unwrap().is_none());

        conn.set_state("test_key", b"value").unwrap();
        assert_eq!(conn.get_state("test_key").unwrap(), Some(b"value".to_vec()));

        conn.set_state("test_key", b"other").unwrap();
        assert_eq!(conn.get_state("test_key").unwrap(), Some(b"other".to_vec()));

        conn.delete_state("test_key").unwrap();
        assert!(conn.get_state("test_key").unwrap().is_none());
    }

    #[test]
    fn test_last_closed_ledger_marker() {
        let conn = setup_db();
        assert!(conn.get_last_closed_ledger().unwrap().is_none());

        let marker = LastClosedLedger {
            root_hash: Hash256::hash(b"root"),
            header: LedgerHeader::genesis(),
        };
        conn.set_last_closed_ledger(&marker).unwrap();
        assert_eq!(conn.get_last_closed_ledger().unwrap(), Some(marker));
    }

    #[test]
    fn test_ledger_to_import_empty_means_none() {
        let conn = setup_db();
        assert!(conn.get_ledger_to_import().unwrap().is_none());

        let root = Hash256::hash(b"target");
        conn.set_ledger_to_import(&root).unwrap();
        assert_eq!(conn.get_ledger_to_import().unwrap(), Some(root));

        conn.clear_ledger_to_import().unwrap();
        assert!(conn.get_ledger_to_import().unwrap().is_none());
        assert_eq!(
            conn.get_state(state_keys::LEDGER_TO_IMPORT).unwrap(),
            Some(Vec::new())
        );
    }

    #[test]
    fn test_truncated_import_marker_is_integrity_error() {
        let conn = setup_db();
        conn.set_state(state_keys::LEDGER_TO_IMPORT, &[1, 2, 3]).unwrap();
        assert!(matches!(
            conn.get_ledger_to_import(),
            Err(DbError::Integrity(_))
        ));
    }
}

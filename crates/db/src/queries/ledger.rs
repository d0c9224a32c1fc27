//! Ledger header queries.
//!
//! Each closed ledger leaves one row in `ledgerheaders`: the encoded header
//! plus the hashes and sequence pulled out for lookups.

use ledgersync_common::{Hash256, LedgerHeader};
use rusqlite::{params, Connection, OptionalExtension};

use super::hash_column;
use crate::error::DbError;

/// Query trait for ledger header operations.
pub trait LedgerQueries {
    /// Loads a ledger header by its sequence number.
    fn load_ledger_header(&self, seq: u32) -> Result<Option<LedgerHeader>, DbError>;

    /// Loads a ledger header by its hash.
    fn load_ledger_header_by_hash(&self, hash: &Hash256)
        -> Result<Option<LedgerHeader>, DbError>;

    /// Stores a ledger header.
    ///
    /// A header with the same sequence is replaced.
    fn store_ledger_header(&self, header: &LedgerHeader) -> Result<(), DbError>;

    /// Returns the highest ledger sequence number stored.
    fn get_latest_ledger_seq(&self) -> Result<Option<u32>, DbError>;

    /// Returns the hash of the ledger with the given sequence.
    fn get_ledger_hash(&self, seq: u32) -> Result<Option<Hash256>, DbError>;
}

fn decode_header(data: Vec<u8>) -> Result<LedgerHeader, DbError> {
    LedgerHeader::from_bytes(&data)
        .map_err(|e| DbError::Integrity(format!("Invalid ledger header: {}", e)))
}

impl LedgerQueries for Connection {
    fn load_ledger_header(&self, seq: u32) -> Result<Option<LedgerHeader>, DbError> {
        let data: Option<Vec<u8>> = self
            .query_row(
                "SELECT data FROM ledgerheaders WHERE ledgerseq = ?1",
                params![seq],
                |row| row.get(0),
            )
            .optional()?;
        data.map(decode_header).transpose()
    }

    fn load_ledger_header_by_hash(
        &self,
        hash: &Hash256,
    ) -> Result<Option<LedgerHeader>, DbError> {
        let data: Option<Vec<u8>> = self
            .query_row(
                "SELECT data FROM ledgerheaders WHERE ledgerhash = ?1",
                params![hash.to_hex()],
                |row| row.get(0),
            )
            .optional()?;
        data.map(decode_header).transpose()
    }

    fn store_ledger_header(&self, header: &LedgerHeader) -> Result<(), DbError> {
        let data = header.to_bytes()?;
        let hash = Hash256::hash(&data);
        self.execute(
            "INSERT OR REPLACE INTO ledgerheaders \
             (ledgerhash, prevhash, statehash, ledgerseq, closetime, data) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                hash.to_hex(),
                header.previous_ledger_hash.to_hex(),
                header.state_hash.to_hex(),
                header.ledger_seq,
                super::to_sql_u64(header.close_time, "close time")?,
                data,
            ],
        )?;
        Ok(())
    }

    fn get_latest_ledger_seq(&self) -> Result<Option<u32>, DbError> {
        let seq: Option<u32> =
            self.query_row("SELECT MAX(ledgerseq) FROM ledgerheaders", [], |row| {
                row.get(0)
            })?;
        Ok(seq)
    }

    fn get_ledger_hash(&self, seq: u32) -> Result<Option<Hash256>, DbError> {
        let hash = self
            .query_row(
                "SELECT ledgerhash FROM ledgerheaders WHERE ledgerseq = ?1",
                params![seq],
                |row| hash_column(row, 0),
            )
            .optional()?;
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CREATE_STATE_TABLES;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_STATE_TABLES).unwrap();
        conn
    }

    #[test]
    fn test_store_and_load_header() {
        let conn = setup_db();
        assert_eq!(conn.get_latest_ledger_seq().unwrap(), None);

        let genesis = LedgerHeader::genesis();
        let first = genesis.next(Hash256::hash(b"one"), 10).unwrap();
        conn.store_ledger_header(&genesis).unwrap();
        conn.store_ledger_header(&first).unwrap();

        assert_eq!(conn.get_latest_ledger_seq().unwrap(), Some(1));
        assert_eq!(conn.load_ledger_header(1).unwrap(), Some(first.clone()));
        assert!(conn.load_ledger_header(2).unwrap().is_none());

        let hash = conn.get_ledger_hash(0).unwrap().unwrap();
        assert_eq!(hash, genesis.hash().unwrap());
        assert_eq!(first.previous_ledger_hash, hash);
        assert_eq!(conn.load_ledger_header_by_hash(&hash).unwrap(), Some(genesis));
    }

    #[test]
    fn test_corrupt_header_is_integrity_error() {
        let conn = setup_db();
        conn.execute(
            "INSERT INTO ledgerheaders (ledgerhash, prevhash, statehash, ledgerseq, closetime, data) \
             VALUES ('a', 'b', 'c', 4, 0, x'01')",
            [],
        )
        .unwrap();
        assert!(matches!(
            conn.load_ledger_header(4),
            Err(DbError::Integrity(_))
        ));
    }
}

//! Account root queries.
//!
//! One row per account in the `accounts` table, keyed by the hex account ID.
//! The account ID determines the content address, so the natural key and
//! the tree index identify the same row.

use ledgersync_common::{AccountEntry, AccountId};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{account_column, from_sql_u64, to_sql_u64};
use crate::error::DbError;

const ACCOUNT_COLUMNS: &str = "accountid, balance, sequence, ownercount, transferrate, \
     inflationdest, publickey, requiredest, requireauth";

/// Query trait for the `accounts` table.
pub trait AccountQueries {
    fn load_account(&self, account_id: &AccountId) -> Result<Option<AccountEntry>, DbError>;

    /// Inserts an account, replacing any row with the same ID.
    fn insert_account(&self, account: &AccountEntry) -> Result<(), DbError>;

    /// Rewrites an existing account.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if no row has this account ID.
    fn update_account(&self, account: &AccountEntry) -> Result<(), DbError>;

    /// Deletes an account. Returns whether a row was removed.
    fn delete_account(&self, account_id: &AccountId) -> Result<bool, DbError>;

    /// Loads every account ordered by ID.
    fn load_accounts(&self) -> Result<Vec<AccountEntry>, DbError>;

    fn count_accounts(&self) -> Result<u64, DbError>;
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<AccountEntry> {
    let inflation_dest: Option<String> = row.get(5)?;
    let inflation_dest = match inflation_dest {
        Some(_) => Some(account_column(row, 5)?),
        None => None,
    };
    let public_key: String = row.get(6)?;
    let mut key = [0u8; 32];
    hex::decode_to_slice(&public_key, &mut key).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(AccountEntry {
        account_id: account_column(row, 0)?,
        balance: from_sql_u64(row, 1)?,
        sequence: row.get(2)?,
        owner_count: row.get(3)?,
        transfer_rate: row.get(4)?,
        inflation_dest,
        public_key: key,
        require_dest: row.get(7)?,
        require_auth: row.get(8)?,
    })
}

impl AccountQueries for Connection {
    fn load_account(&self, account_id: &AccountId) -> Result<Option<AccountEntry>, DbError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE accountid = ?1");
        let account = self
            .query_row(&sql, params![account_id.to_hex()], account_from_row)
            .optional()?;
        Ok(account)
    }

    fn insert_account(&self, account: &AccountEntry) -> Result<(), DbError> {
        self.execute(
            "INSERT OR REPLACE INTO accounts (accountid, balance, sequence, ownercount, \
             transferrate, inflationdest, publickey, requiredest, requireauth) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                account.account_id.to_hex(),
                to_sql_u64(account.balance, "balance")?,
                account.sequence,
                account.owner_count,
                account.transfer_rate,
                account.inflation_dest.map(|id| id.to_hex()),
                hex::encode(account.public_key),
                account.require_dest,
                account.require_auth,
            ],
        )?;
        Ok(())
    }

    fn update_account(&self, account: &AccountEntry) -> Result<(), DbError> {
        let changed = self.execute(
            "UPDATE accounts SET balance = ?2, sequence = ?3, ownercount = ?4, \
             transferrate = ?5, inflationdest = ?6, publickey = ?7, requiredest = ?8, \
             requireauth = ?9 WHERE accountid = ?1",
            params![
                account.account_id.to_hex(),
                to_sql_u64(account.balance, "balance")?,
                account.sequence,
                account.owner_count,
                account.transfer_rate,
                account.inflation_dest.map(|id| id.to_hex()),
                hex::encode(account.public_key),
                account.require_dest,
                account.require_auth,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound(format!("account {}", account.account_id)));
        }
        Ok(())
    }

    fn delete_account(&self, account_id: &AccountId) -> Result<bool, DbError> {
        let removed = self.execute(
            "DELETE FROM accounts WHERE accountid = ?1",
            params![account_id.to_hex()],
        )?;
        Ok(removed > 0)
    }

    fn load_accounts(&self) -> Result<Vec<AccountEntry>, DbError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY accountid");
        let mut stmt = self.prepare(&sql)?;
        let accounts = stmt
            .query_map([], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    fn count_accounts(&self) -> Result<u64, DbError> {
        let count: i64 = self.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CREATE_ENTRY_TABLES;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_ENTRY_TABLES).unwrap();
        conn
    }

    #[test]
    fn test_insert_and_load_account() {
        let conn = setup_db();
        let mut account = AccountEntry::new(AccountId([7; 20]), 1_000);
        account.inflation_dest = Some(AccountId([9; 20]));
        account.public_key = [3; 32];
        account.require_auth = true;

        conn.insert_account(&account).unwrap();
        assert_eq!(conn.load_account(&account.account_id).unwrap(), Some(account));
        assert!(conn.load_account(&AccountId([8; 20])).unwrap().is_none());
    }

    #[test]
    fn test_update_missing_account_is_not_found() {
        let conn = setup_db();
        let account = AccountEntry::new(AccountId([1; 20]), 5);
        assert!(matches!(
            conn.update_account(&account),
            Err(DbError::NotFound(_))
        ));

        conn.insert_account(&account).unwrap();
        let mut changed = account.clone();
        changed.balance = 99;
        changed.sequence = 4;
        conn.update_account(&changed).unwrap();
        assert_eq!(conn.load_account(&account.account_id).unwrap(), Some(changed));
    }

    #[test]
    fn test_delete_and_count() {
        let conn = setup_db();
        conn.insert_account(&AccountEntry::new(AccountId([1; 20]), 5))
            .unwrap();
        conn.insert_account(&AccountEntry::new(AccountId([2; 20]), 6))
            .unwrap();
        assert_eq!(conn.count_accounts().unwrap(), 2);

        assert!(conn.delete_account(&AccountId([1; 20])).unwrap());
        assert!(!conn.delete_account(&AccountId([1; 20])).unwrap());
        assert_eq!(conn.count_accounts().unwrap(), 1);
        assert_eq!(conn.load_accounts().unwrap()[0].account_id, AccountId([2; 20]));
    }

    #[test]
    fn test_balance_above_i64_rejected() {
        let conn = setup_db();
        let account = AccountEntry::new(AccountId([1; 20]), u64::MAX);
        assert!(matches!(
            conn.insert_account(&account),
            Err(DbError::Integrity(_))
        ));
    }
}

//! Trust line queries.
//!
//! Trust lines are keyed by their content address (`trustindex`), which is
//! derived from the ordered account pair and the currency.

use ledgersync_common::{AccountId, Hash256, TrustLineEntry};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{account_column, currency_column, currency_to_sql};
use crate::error::DbError;

const TRUST_LINE_COLUMNS: &str = "lowaccount, highaccount, currency, lowlimit, highlimit, \
     balance, lowauthset, highauthset";

/// Query trait for the `trustlines` table.
pub trait TrustLineQueries {
    fn load_trust_line(&self, index: &Hash256) -> Result<Option<TrustLineEntry>, DbError>;

    /// Lines where the account is either side, ordered by index.
    fn load_trust_lines_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<TrustLineEntry>, DbError>;

    /// Inserts a line, replacing any row with the same index.
    fn insert_trust_line(&self, line: &TrustLineEntry) -> Result<(), DbError>;

    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if the line does not exist.
    fn update_trust_line(&self, line: &TrustLineEntry) -> Result<(), DbError>;

    fn delete_trust_line(&self, index: &Hash256) -> Result<bool, DbError>;

    fn load_trust_lines(&self) -> Result<Vec<TrustLineEntry>, DbError>;

    fn count_trust_lines(&self) -> Result<u64, DbError>;
}

fn trust_line_from_row(row: &Row<'_>) -> rusqlite::Result<TrustLineEntry> {
    Ok(TrustLineEntry {
        low_account: account_column(row, 0)?,
        high_account: account_column(row, 1)?,
        currency: currency_column(row, 2)?,
        low_limit: row.get(3)?,
        high_limit: row.get(4)?,
        balance: row.get(5)?,
        low_auth_set: row.get(6)?,
        high_auth_set: row.get(7)?,
    })
}

impl TrustLineQueries for Connection {
    fn load_trust_line(&self, index: &Hash256) -> Result<Option<TrustLineEntry>, DbError> {
        let sql = format!("SELECT {TRUST_LINE_COLUMNS} FROM trustlines WHERE trustindex = ?1");
        let line = self
            .query_row(&sql, params![index.to_hex()], trust_line_from_row)
            .optional()?;
        Ok(line)
    }

    fn load_trust_lines_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<TrustLineEntry>, DbError> {
        let sql = format!(
            "SELECT {TRUST_LINE_COLUMNS} FROM trustlines \
             WHERE lowaccount = ?1 OR highaccount = ?1 ORDER BY trustindex"
        );
        let mut stmt = self.prepare(&sql)?;
        let lines = stmt
            .query_map(params![account_id.to_hex()], trust_line_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines)
    }

    fn insert_trust_line(&self, line: &TrustLineEntry) -> Result<(), DbError> {
        self.execute(
            "INSERT OR REPLACE INTO trustlines (trustindex, lowaccount, highaccount, currency, \
             lowlimit, highlimit, balance, lowauthset, highauthset) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                line.index().to_hex(),
                line.low_account.to_hex(),
                line.high_account.to_hex(),
                currency_to_sql(&line.currency),
                line.low_limit,
                line.high_limit,
                line.balance,
                line.low_auth_set,
                line.high_auth_set,
            ],
        )?;
        Ok(())
    }

    fn update_trust_line(&self, line: &TrustLineEntry) -> Result<(), DbError> {
        let index = line.index();
        let changed = self.execute(
            "UPDATE trustlines SET lowlimit = ?2, highlimit = ?3, balance = ?4, \
             lowauthset = ?5, highauthset = ?6 WHERE trustindex = ?1",
            params![
                index.to_hex(),
                line.low_limit,
                line.high_limit,
                line.balance,
                line.low_auth_set,
                line.high_auth_set,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound(format!("trust line {}", index)));
        }
        Ok(())
    }

    fn delete_trust_line(&self, index: &Hash256) -> Result<bool, DbError> {
        let removed = self.execute(
            "DELETE FROM trustlines WHERE trustindex = ?1",
            params![index.to_hex()],
        )?;
        Ok(removed > 0)
    }

    fn load_trust_lines(&self) -> Result<Vec<TrustLineEntry>, DbError> {
        let sql = format!("SELECT {TRUST_LINE_COLUMNS} FROM trustlines ORDER BY trustindex");
        let mut stmt = self.prepare(&sql)?;
        let lines = stmt
            .query_map([], trust_line_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines)
    }

    fn count_trust_lines(&self) -> Result<u64, DbError> {
        let count: i64 =
            self.query_row("SELECT COUNT(*) FROM trustlines", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CREATE_ENTRY_TABLES;
    use ledgersync_common::Currency;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_ENTRY_TABLES).unwrap();
        conn
    }

    fn usd_line(a: u8, b: u8) -> TrustLineEntry {
        let mut line = TrustLineEntry::new(
            AccountId([a; 20]),
            AccountId([b; 20]),
            Currency::from_code("USD").unwrap(),
        );
        line.high_limit = 500;
        line.balance = -20;
        line
    }

    #[test]
    fn test_insert_and_load_by_index() {
        let conn = setup_db();
        let line = usd_line(2, 1);
        conn.insert_trust_line(&line).unwrap();
        assert_eq!(conn.load_trust_line(&line.index()).unwrap(), Some(line));
    }

    #[test]
    fn test_load_by_either_side() {
        let conn = setup_db();
        conn.insert_trust_line(&usd_line(1, 2)).unwrap();
        conn.insert_trust_line(&usd_line(2, 3)).unwrap();
        conn.insert_trust_line(&usd_line(3, 4)).unwrap();

        assert_eq!(
            conn.load_trust_lines_by_account(&AccountId([2; 20]))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            conn.load_trust_lines_by_account(&AccountId([4; 20]))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(conn.count_trust_lines().unwrap(), 3);
    }

    #[test]
    fn test_update_and_delete() {
        let conn = setup_db();
        let mut line = usd_line(1, 2);
        assert!(matches!(
            conn.update_trust_line(&line),
            Err(DbError::NotFound(_))
        ));

        conn.insert_trust_line(&line).unwrap();
        line.balance = 42;
        line.low_auth_set = true;
        conn.update_trust_line(&line).unwrap();
        assert_eq!(conn.load_trust_line(&line.index()).unwrap(), Some(line.clone()));

        assert!(conn.delete_trust_line(&line.index()).unwrap());
        assert!(conn.load_trust_lines().unwrap().is_empty());
    }
}

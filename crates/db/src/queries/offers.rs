//! Offer queries.
//!
//! Offers are keyed by `(accountid, sequence)`, the same fields their content
//! address is derived from.

use ledgersync_common::{AccountId, Amount, OfferEntry};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{account_column, currency_column, currency_to_sql};
use crate::error::DbError;

const OFFER_COLUMNS: &str = "accountid, sequence, takerpayscurrency, takerpaysamount, \
     takerpaysissuer, takergetscurrency, takergetsamount, takergetsissuer, expiration, passive";

/// Query trait for the `offers` table.
pub trait OfferQueries {
    fn load_offer(&self, account_id: &AccountId, sequence: u32)
        -> Result<Option<OfferEntry>, DbError>;

    /// Offers owned by an account, ordered by sequence.
    fn load_offers_by_account(&self, account_id: &AccountId) -> Result<Vec<OfferEntry>, DbError>;

    /// Inserts an offer, replacing any offer with the same key.
    fn insert_offer(&self, offer: &OfferEntry) -> Result<(), DbError>;

    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if the offer does not exist.
    fn update_offer(&self, offer: &OfferEntry) -> Result<(), DbError>;

    fn delete_offer(&self, account_id: &AccountId, sequence: u32) -> Result<bool, DbError>;

    fn load_offers(&self) -> Result<Vec<OfferEntry>, DbError>;

    fn count_offers(&self) -> Result<u64, DbError>;
}

fn offer_from_row(row: &Row<'_>) -> rusqlite::Result<OfferEntry> {
    Ok(OfferEntry {
        account_id: account_column(row, 0)?,
        sequence: row.get(1)?,
        taker_pays: Amount {
            currency: currency_column(row, 2)?,
            value: row.get(3)?,
            issuer: account_column(row, 4)?,
        },
        taker_gets: Amount {
            currency: currency_column(row, 5)?,
            value: row.get(6)?,
            issuer: account_column(row, 7)?,
        },
        expiration: row.get(8)?,
        passive: row.get(9)?,
    })
}

impl OfferQueries for Connection {
    fn load_offer(
        &self,
        account_id: &AccountId,
        sequence: u32,
    ) -> Result<Option<OfferEntry>, DbError> {
        let sql = format!("SELECT {OFFER_COLUMNS} FROM offers WHERE accountid = ?1 AND sequence = ?2");
        let offer = self
            .query_row(&sql, params![account_id.to_hex(), sequence], offer_from_row)
            .optional()?;
        Ok(offer)
    }

    fn load_offers_by_account(&self, account_id: &AccountId) -> Result<Vec<OfferEntry>, DbError> {
        let sql =
            format!("SELECT {OFFER_COLUMNS} FROM offers WHERE accountid = ?1 ORDER BY sequence");
        let mut stmt = self.prepare(&sql)?;
        let offers = stmt
            .query_map(params![account_id.to_hex()], offer_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(offers)
    }

    fn insert_offer(&self, offer: &OfferEntry) -> Result<(), DbError> {
        self.execute(
            "INSERT OR REPLACE INTO offers (accountid, sequence, takerpayscurrency, \
             takerpaysamount, takerpaysissuer, takergetscurrency, takergetsamount, \
             takergetsissuer, expiration, passive) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                offer.account_id.to_hex(),
                offer.sequence,
                currency_to_sql(&offer.taker_pays.currency),
                offer.taker_pays.value,
                offer.taker_pays.issuer.to_hex(),
                currency_to_sql(&offer.taker_gets.currency),
                offer.taker_gets.value,
                offer.taker_gets.issuer.to_hex(),
                offer.expiration,
                offer.passive,
            ],
        )?;
        Ok(())
    }

    fn update_offer(&self, offer: &OfferEntry) -> Result<(), DbError> {
        let changed = self.execute(
            "UPDATE offers SET takerpayscurrency = ?3, takerpaysamount = ?4, \
             takerpaysissuer = ?5, takergetscurrency = ?6, takergetsamount = ?7, \
             takergetsissuer = ?8, expiration = ?9, passive = ?10 \
             WHERE accountid = ?1 AND sequence = ?2",
            params![
                offer.account_id.to_hex(),
                offer.sequence,
                currency_to_sql(&offer.taker_pays.currency),
                offer.taker_pays.value,
                offer.taker_pays.issuer.to_hex(),
                currency_to_sql(&offer.taker_gets.currency),
                offer.taker_gets.value,
                offer.taker_gets.issuer.to_hex(),
                offer.expiration,
                offer.passive,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound(format!(
                "offer {}:{}",
                offer.account_id, offer.sequence
            )));
        }
        Ok(())
    }

    fn delete_offer(&self, account_id: &AccountId, sequence: u32) -> Result<bool, DbError> {
        let removed = self.execute(
            "DELETE FROM offers WHERE accountid = ?1 AND sequence = ?2",
            params![account_id.to_hex(), sequence],
        )?;
        Ok(removed > 0)
    }

    fn load_offers(&self) -> Result<Vec<OfferEntry>, DbError> {
        let sql = format!("SELECT {OFFER_COLUMNS} FROM offers ORDER BY accountid, sequence");
        let mut stmt = self.prepare(&sql)?;
        let offers = stmt
            .query_map([], offer_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(offers)
    }

    fn count_offers(&self) -> Result<u64, DbError> {
        let count: i64 = self.query_row("SELECT COUNT(*) FROM offers", [], |row| row.get(0))?;
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

    fn offer(owner: u8, sequence: u32) -> OfferEntry {
        OfferEntry {
            account_id: AccountId([owner; 20]),
            sequence,
            taker_pays: Amount::native(1_000),
            taker_gets: Amount::issued(
                Currency::from_code("EUR").unwrap(),
                AccountId([0xee; 20]),
                25,
            ),
            expiration: 0,
            passive: false,
        }
    }

    #[test]
    fn test_insert_or_replace_keeps_one_row() {
        let conn = setup_db();
        let mut o = offer(1, 10);
        conn.insert_offer(&o).unwrap();
        o.taker_gets.value = 30;
        conn.insert_offer(&o).unwrap();

        assert_eq!(conn.count_offers().unwrap(), 1);
        assert_eq!(conn.load_offer(&o.account_id, 10).unwrap(), Some(o));
    }

    #[test]
    fn test_offers_by_account_ordered_by_sequence() {
        let conn = setup_db();
        conn.insert_offer(&offer(1, 12)).unwrap();
        conn.insert_offer(&offer(1, 3)).unwrap();
        conn.insert_offer(&offer(2, 7)).unwrap();

        let owned = conn.load_offers_by_account(&AccountId([1; 20])).unwrap();
        let sequences: Vec<u32> = owned.iter().map(|o| o.sequence).collect();
        assert_eq!(sequences, vec![3, 12]);
    }

    #[test]
    fn test_update_and_delete() {
        let conn = setup_db();
        let mut o = offer(5, 1);
        assert!(matches!(conn.update_offer(&o), Err(DbError::NotFound(_))));

        conn.insert_offer(&o).unwrap();
        o.passive = true;
        o.expiration = 900;
        conn.update_offer(&o).unwrap();
        assert_eq!(conn.load_offer(&o.account_id, 1).unwrap(), Some(o.clone()));

        assert!(conn.delete_offer(&o.account_id, 1).unwrap());
        assert!(conn.load_offer(&o.account_id, 1).unwrap().is_none());
    }
}

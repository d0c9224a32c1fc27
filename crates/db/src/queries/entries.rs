//! Kind-dispatching entry mutations.
//!
//! The synchronization engine deals in [`LedgerEntry`] values; this trait
//! routes each one to the table for its kind.

use ledgersync_common::{EntryKind, LedgerEntry};
use rusqlite::Connection;

use super::{AccountQueries, OfferQueries, TrustLineQueries};
use crate::error::DbError;

/// Row counts of the projection tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryCounts {
    pub accounts: u64,
    pub trust_lines: u64,
    pub offers: u64,
}

impl EntryCounts {
    pub fn total(&self) -> u64 {
        self.accounts + self.trust_lines + self.offers
    }
}

/// Entry-level operations over all projection tables.
pub trait EntryQueries {
    /// Writes an entry that is new in the target state.
    ///
    /// Existing rows under the same key are replaced, so re-adding after an
    /// interrupted import is harmless.
    fn store_add(&self, entry: &LedgerEntry) -> Result<(), DbError>;

    /// Rewrites an entry present in both the old and new state.
    fn store_change(&self, entry: &LedgerEntry) -> Result<(), DbError>;

    /// Removes an entry. Deleting a missing row is not an error.
    fn store_delete(&self, entry: &LedgerEntry) -> Result<(), DbError>;

    /// Loads the stored row with the same key as `entry`, whatever its
    /// payload.
    fn load_entry(&self, entry: &LedgerEntry) -> Result<Option<LedgerEntry>, DbError>;

    fn count_entries(&self) -> Result<EntryCounts, DbError>;

    /// Loads entries of one kind, or of every kind when `kind` is `None`.
    fn load_all_entries(&self, kind: Option<EntryKind>) -> Result<Vec<LedgerEntry>, DbError>;
}

impl EntryQueries for Connection {
    fn store_add(&self, entry: &LedgerEntry) -> Result<(), DbError> {
        match entry {
            LedgerEntry::Account(account) => self.insert_account(account),
            LedgerEntry::TrustLine(line) => self.insert_trust_line(line),
            LedgerEntry::Offer(offer) => self.insert_offer(offer),
        }
    }

    fn store_change(&self, entry: &LedgerEntry) -> Result<(), DbError> {
        match entry {
            LedgerEntry::Account(account) => self.update_account(account),
            LedgerEntry::TrustLine(line) => self.update_trust_line(line),
            LedgerEntry::Offer(offer) => self.update_offer(offer),
        }
    }

    fn store_delete(&self, entry: &LedgerEntry) -> Result<(), DbError> {
        match entry {
            LedgerEntry::Account(account) => self.delete_account(&account.account_id),
            LedgerEntry::TrustLine(line) => self.delete_trust_line(&line.index()),
            LedgerEntry::Offer(offer) => self.delete_offer(&offer.account_id, offer.sequence),
        }?;
        Ok(())
    }

    fn load_entry(&self, entry: &LedgerEntry) -> Result<Option<LedgerEntry>, DbError> {
        let stored = match entry {
            LedgerEntry::Account(account) => self
                .load_account(&account.account_id)?
                .map(LedgerEntry::from),
            LedgerEntry::TrustLine(line) => self
                .load_trust_line(&line.index())?
                .map(LedgerEntry::from),
            LedgerEntry::Offer(offer) => self
                .load_offer(&offer.account_id, offer.sequence)?
                .map(LedgerEntry::from),
        };
        Ok(stored)
    }

    fn count_entries(&self) -> Result<EntryCounts, DbError> {
        Ok(EntryCounts {
            accounts: self.count_accounts()?,
            trust_lines: self.count_trust_lines()?,
            offers: self.count_offers()?,
        })
    }

    fn load_all_entries(&self, kind: Option<EntryKind>) -> Result<Vec<LedgerEntry>, DbError> {
        let wants = |k: EntryKind| kind.map_or(true, |wanted| wanted == k);
        let mut entries = Vec::new();
        if wants(EntryKind::Account) {
            entries.extend(self.load_accounts()?.into_iter().map(LedgerEntry::from));
        }
        if wants(EntryKind::TrustLine) {
            entries.extend(self.load_trust_lines()?.into_iter().map(LedgerEntry::from));
        }
        if wants(EntryKind::Offer) {
            entries.extend(self.load_offers()?.into_iter().map(LedgerEntry::from));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CREATE_ENTRY_TABLES;
    use ledgersync_common::{AccountEntry, AccountId, Amount, Currency, OfferEntry, TrustLineEntry};

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_ENTRY_TABLES).unwrap();
        conn
    }

    fn sample_entries() -> Vec<LedgerEntry> {
        let a = AccountId([1; 20]);
        let b = AccountId([2; 20]);
        vec![
            AccountEntry::new(a, 100).into(),
            AccountEntry::new(b, 200).into(),
            TrustLineEntry::new(a, b, Currency::from_code("USD").unwrap()).into(),
            OfferEntry {
                account_id: a,
                sequence: 3,
                taker_pays: Amount::native(10),
                taker_gets: Amount::issued(Currency::from_code("USD").unwrap(), b, 1),
                expiration: 0,
                passive: false,
            }
            .into(),
        ]
    }

    #[test]
    fn test_add_change_delete_dispatch() {
        let conn = setup_db();
        for entry in sample_entries() {
            conn.store_add(&entry).unwrap();
        }
        assert_eq!(
            conn.count_entries().unwrap(),
            EntryCounts {
                accounts: 2,
                trust_lines: 1,
                offers: 1
            }
        );

        let mut account = AccountEntry::new(AccountId([1; 20]), 100);
        account.balance = 55;
        conn.store_change(&LedgerEntry::from(account.clone())).unwrap();
        assert_eq!(
            conn.load_account(&account.account_id).unwrap().unwrap().balance,
            55
        );

        for entry in sample_entries() {
            conn.store_delete(&entry).unwrap();
        }
        assert_eq!(conn.count_entries().unwrap().total(), 0);
    }

    #[test]
    fn test_load_entry_by_key() {
        let conn = setup_db();
        let entries = sample_entries();
        assert!(conn.load_entry(&entries[2]).unwrap().is_none());
        conn.store_add(&entries[2]).unwrap();
        assert_eq!(conn.load_entry(&entries[2]).unwrap(), Some(entries[2].clone()));

        let mut lookup = AccountEntry::new(AccountId([1; 20]), 0);
        conn.store_add(&entries[0]).unwrap();
        lookup.sequence = 77;
        assert_eq!(
            conn.load_entry(&LedgerEntry::from(lookup)).unwrap(),
            Some(entries[0].clone())
        );
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let conn = setup_db();
        for entry in sample_entries() {
            conn.store_delete(&entry).unwrap();
        }
    }

    #[test]
    fn test_change_missing_is_not_found() {
        let conn = setup_db();
        let entry: LedgerEntry = AccountEntry::new(AccountId([9; 20]), 1).into();
        assert!(matches!(conn.store_change(&entry), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_load_all_entries_filters_by_kind() {
        let conn = setup_db();
        for entry in sample_entries() {
            conn.store_add(&entry).unwrap();
        }
        assert_eq!(conn.load_all_entries(None).unwrap().len(), 4);
        let lines = conn.load_all_entries(Some(EntryKind::TrustLine)).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].kind(), EntryKind::TrustLine);
        assert!(conn
            .load_all_entries(Some(EntryKind::Unknown(7)))
            .unwrap()
            .is_empty());
    }
}

//! Query traits over `rusqlite::Connection`.
//!
//! Each table gets its own trait implemented for [`Connection`], so any
//! connection (pooled reader, the writer's transaction connection, or a
//! bare test connection) can run them.

mod accounts;
mod entries;
mod ledger;
mod offers;
mod state;
mod trustlines;

pub use accounts::AccountQueries;
pub use entries::{EntryCounts, EntryQueries};
pub use ledger::LedgerQueries;
pub use offers::OfferQueries;
pub use state::StateQueries;
pub use trustlines::TrustLineQueries;

use ledgersync_common::{AccountId, Currency, Hash256};
use rusqlite::types::Type;

use crate::error::DbError;

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn account_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<AccountId> {
    let text: String = row.get(idx)?;
    AccountId::from_hex(&text).map_err(|e| conversion_error(idx, e))
}

/// Currencies are stored as 40 hex digits, never in their display form.
pub(crate) fn currency_to_sql(currency: &Currency) -> String {
    hex::encode(currency.0)
}

pub(crate) fn currency_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Currency> {
    let text: String = row.get(idx)?;
    let mut raw = [0u8; 20];
    hex::decode_to_slice(&text, &mut raw).map_err(|e| conversion_error(idx, e))?;
    Ok(Currency(raw))
}

pub(crate) fn hash_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Hash256> {
    let text: String = row.get(idx)?;
    Hash256::from_hex(&text).map_err(|e| conversion_error(idx, e))
}

/// SQLite integers are signed; balances above `i64::MAX` are refused.
pub(crate) fn to_sql_u64(value: u64, what: &str) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::Integrity(format!("{what} {value} out of range")))
}

pub(crate) fn from_sql_u64(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

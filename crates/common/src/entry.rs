//! Typed ledger entries.
//!
//! The ledger tracks three kinds of entries in its relational projection:
//!
//! - [`AccountEntry`]: native balance, sequence number and account flags
//! - [`TrustLineEntry`]: a credit line between two accounts in one currency
//! - [`OfferEntry`]: an order on the exchange
//!
//! [`LedgerEntry`] is the closed sum over these kinds. It is built from a raw
//! [`TreeItem`] by [`LedgerEntry::from_tree_item`], which returns `None` for
//! kind tags this version does not know about so that newer ledgers can carry
//! entry kinds the projection simply ignores.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{content_address, Error, Hash256, Result, TreeItem};

/// A 160-bit account identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 20]);

impl AccountId {
    /// Creates an account ID from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex form, as stored in the entry tables.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses the hex form produced by [`to_hex`](Self::to_hex).
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes =
            hex::decode(s).map_err(|e| Error::InvalidData(format!("account id {s}: {e}")))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| Error::InvalidData(format!("account id {s}: expected 20 bytes")))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.to_hex())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A 160-bit currency code.
///
/// All-zero is the native currency. A standard code keeps its three ASCII
/// characters at bytes 12..15 with every other byte zero.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Currency(pub [u8; 20]);

impl Currency {
    /// The native currency.
    pub const NATIVE: Self = Self([0u8; 20]);

    /// Display code of the native currency.
    pub const NATIVE_CODE: &'static str = "STR";

    /// Builds a currency from a three-letter code, or the native code.
    pub fn from_code(code: &str) -> Option<Self> {
        if code == Self::NATIVE_CODE {
            return Some(Self::NATIVE);
        }
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphanumeric) {
            return None;
        }
        let mut raw = [0u8; 20];
        raw[12..15].copy_from_slice(bytes);
        Some(Self(raw))
    }

    /// Returns `true` for the native currency.
    pub fn is_native(&self) -> bool {
        *self == Self::NATIVE
    }

    /// Human readable form: `STR`, a three-letter code, or 40 hex digits.
    pub fn to_human(&self) -> String {
        if self.is_native() {
            return Self::NATIVE_CODE.to_string();
        }
        let code = &self.0[12..15];
        let standard = self.0[..12].iter().all(|b| *b == 0)
            && self.0[15..].iter().all(|b| *b == 0)
            && code.iter().all(u8::is_ascii_alphanumeric);
        if standard {
            String::from_utf8_lossy(code).into_owned()
        } else {
            hex::encode(self.0)
        }
    }

    /// Parses the form produced by [`to_human`](Self::to_human).
    pub fn from_human(s: &str) -> Result<Self> {
        if let Some(currency) = Self::from_code(s) {
            return Ok(currency);
        }
        let bytes = hex::decode(s).map_err(|e| Error::InvalidData(format!("currency {s}: {e}")))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| Error::InvalidData(format!("currency {s}: expected 20 bytes")))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({})", self.to_human())
    }
}

/// An amount of some currency issued by some account.
///
/// Native amounts carry a zero issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub currency: Currency,
    pub issuer: AccountId,
    pub value: i64,
}

impl Amount {
    /// A native amount.
    pub fn native(value: i64) -> Self {
        Self {
            currency: Currency::NATIVE,
            issuer: AccountId::default(),
            value,
        }
    }

    /// An issued (credit) amount.
    pub fn issued(currency: Currency, issuer: AccountId, value: i64) -> Self {
        Self {
            currency,
            issuer,
            value,
        }
    }
}

/// An account root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub account_id: AccountId,
    /// Native balance in drops.
    pub balance: u64,
    pub sequence: u32,
    /// Number of trust lines and offers owned, used for the reserve.
    pub owner_count: u32,
    pub transfer_rate: u32,
    pub inflation_dest: Option<AccountId>,
    pub public_key: [u8; 32],
    pub require_dest: bool,
    pub require_auth: bool,
}

impl AccountEntry {
    /// Creates an account with the given balance and every other field at its default.
    pub fn new(account_id: AccountId, balance: u64) -> Self {
        Self {
            account_id,
            balance,
            sequence: 1,
            owner_count: 0,
            transfer_rate: 0,
            inflation_dest: None,
            public_key: [0u8; 32],
            require_dest: false,
            require_auth: false,
        }
    }

    pub fn index(&self) -> Hash256 {
        content_address(EntryKind::ACCOUNT_TAG, &[self.account_id.as_bytes()])
    }
}

/// A trust line between two accounts.
///
/// The accounts are stored ordered: `low_account < high_account`. A positive
/// balance means the high account holds credit issued by the low account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustLineEntry {
    pub low_account: AccountId,
    pub high_account: AccountId,
    pub currency: Currency,
    pub low_limit: i64,
    pub high_limit: i64,
    pub balance: i64,
    /// The high account has authorized the low account to hold its credit.
    pub low_auth_set: bool,
    pub high_auth_set: bool,
}

impl TrustLineEntry {
    /// Creates an empty line between `a` and `b`, ordering the pair.
    pub fn new(a: AccountId, b: AccountId, currency: Currency) -> Self {
        let (low_account, high_account) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low_account,
            high_account,
            currency,
            low_limit: 0,
            high_limit: 0,
            balance: 0,
            low_auth_set: false,
            high_auth_set: false,
        }
    }

    pub fn index(&self) -> Hash256 {
        content_address(
            EntryKind::TRUST_LINE_TAG,
            &[
                self.low_account.as_bytes(),
                self.high_account.as_bytes(),
                &self.currency.0,
            ],
        )
    }
}

/// An exchange offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferEntry {
    pub account_id: AccountId,
    /// Sequence number of the transaction that created the offer.
    pub sequence: u32,
    pub taker_pays: Amount,
    pub taker_gets: Amount,
    /// Close time after which the offer is void; zero for none.
    pub expiration: u32,
    pub passive: bool,
}

impl OfferEntry {
    pub fn index(&self) -> Hash256 {
        content_address(
            EntryKind::OFFER_TAG,
            &[self.account_id.as_bytes(), &self.sequence.to_be_bytes()],
        )
    }
}

/// Classification of a raw item by its kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Account,
    TrustLine,
    Offer,
    /// A kind this version does not project.
    Unknown(u16),
}

impl EntryKind {
    /// Tag of account roots (`'a'`).
    pub const ACCOUNT_TAG: u16 = 0x0061;
    /// Tag of trust lines (`'r'`).
    pub const TRUST_LINE_TAG: u16 = 0x0072;
    /// Tag of offers (`'o'`).
    pub const OFFER_TAG: u16 = 0x006f;

    pub fn from_tag(tag: u16) -> Self {
        match tag {
            Self::ACCOUNT_TAG => Self::Account,
            Self::TRUST_LINE_TAG => Self::TrustLine,
            Self::OFFER_TAG => Self::Offer,
            other => Self::Unknown(other),
        }
    }

    pub fn tag(self) -> u16 {
        match self {
            Self::Account => Self::ACCOUNT_TAG,
            Self::TrustLine => Self::TRUST_LINE_TAG,
            Self::Offer => Self::OFFER_TAG,
            Self::Unknown(tag) => tag,
        }
    }

    /// Name used in logs and in the entry table dumps.
    pub fn name(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::TrustLine => "trustline",
            Self::Offer => "offer",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(tag) => write!(f, "unknown({tag:#06x})"),
            other => f.write_str(other.name()),
        }
    }
}

/// A ledger entry tracked by the relational projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntry {
    Account(AccountEntry),
    TrustLine(TrustLineEntry),
    Offer(OfferEntry),
}

impl LedgerEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Account(_) => EntryKind::Account,
            Self::TrustLine(_) => EntryKind::TrustLine,
            Self::Offer(_) => EntryKind::Offer,
        }
    }

    /// Content address of the entry.
    pub fn index(&self) -> Hash256 {
        match self {
            Self::Account(account) => account.index(),
            Self::TrustLine(line) => line.index(),
            Self::Offer(offer) => offer.index(),
        }
    }

    /// Decodes a tree item.
    ///
    /// Returns `Ok(None)` for kinds this version does not project.
    ///
    /// # Errors
    ///
    /// Fails if the item is too short to carry a kind tag, if a known kind's
    /// body does not decode, or if the item is stored under an index other
    /// than the entry's content address.
    pub fn from_tree_item(item: &TreeItem) -> Result<Option<Self>> {
        let tag = item.kind_tag().ok_or_else(|| {
            Error::InvalidData(format!("tree item {} has no kind tag", item.index))
        })?;
        let entry = match EntryKind::from_tag(tag) {
            EntryKind::Account => Self::Account(bincode::deserialize(item.body())?),
            EntryKind::TrustLine => Self::TrustLine(bincode::deserialize(item.body())?),
            EntryKind::Offer => Self::Offer(bincode::deserialize(item.body())?),
            EntryKind::Unknown(_) => return Ok(None),
        };
        let index = entry.index();
        if index != item.index {
            return Err(Error::InvalidData(format!(
                "{} stored at {} but addresses to {}",
                entry.kind(),
                item.index,
                index
            )));
        }
        Ok(Some(entry))
    }

    /// Encodes the entry as a tree item under its content address.
    pub fn to_tree_item(&self) -> Result<TreeItem> {
        let body = match self {
            Self::Account(account) => bincode::serialize(account)?,
            Self::TrustLine(line) => bincode::serialize(line)?,
            Self::Offer(offer) => bincode::serialize(offer)?,
        };
        Ok(TreeItem::with_tag(self.index(), self.kind().tag(), &body))
    }
}

impl From<AccountEntry> for LedgerEntry {
    fn from(entry: AccountEntry) -> Self {
        Self::Account(entry)
    }
}

impl From<TrustLineEntry> for LedgerEntry {
    fn from(entry: TrustLineEntry) -> Self {
        Self::TrustLine(entry)
    }
}

impl From<OfferEntry> for LedgerEntry {
    fn from(entry: OfferEntry) -> Self {
        Self::Offer(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(byte: u8) -> AccountId {
        AccountId([byte; 20])
    }

    #[test]
    fn test_currency_human_codes() {
        assert_eq!(Currency::NATIVE.to_human(), "STR");
        let usd = Currency::from_code("USD").unwrap();
        assert_eq!(usd.to_human(), "USD");
        assert_eq!(Currency::from_human("USD").unwrap(), usd);
        assert!(Currency::from_code("DOLLAR").is_none());

        let odd = Currency([0xab; 20]);
        assert_eq!(odd.to_human().len(), 40);
        assert_eq!(Currency::from_human(&odd.to_human()).unwrap(), odd);
    }

    #[test]
    fn test_trust_line_orders_accounts() {
        let usd = Currency::from_code("USD").unwrap();
        let a = TrustLineEntry::new(account(9), account(1), usd);
        let b = TrustLineEntry::new(account(1), account(9), usd);
        assert_eq!(a.low_account, account(1));
        assert_eq!(a.high_account, account(9));
        assert_eq!(a.index(), b.index());
    }

    #[test]
    fn test_tree_item_round_trip() {
        let entry = LedgerEntry::Account(AccountEntry::new(account(3), 100));
        let item = entry.to_tree_item().unwrap();
        assert_eq!(item.index, entry.index());
        assert_eq!(item.kind_tag(), Some(EntryKind::ACCOUNT_TAG));
        assert_eq!(LedgerEntry::from_tree_item(&item).unwrap(), Some(entry));
    }

    #[test]
    fn test_unknown_kind_is_skipped() {
        let item = TreeItem::with_tag(Hash256::hash(b"x"), 0x0064, b"whatever");
        assert!(LedgerEntry::from_tree_item(&item).unwrap().is_none());
    }

    #[test]
    fn test_index_mismatch_is_rejected() {
        let entry = LedgerEntry::Account(AccountEntry::new(account(3), 100));
        let mut item = entry.to_tree_item().unwrap();
        item.index = Hash256::hash(b"elsewhere");
        assert!(LedgerEntry::from_tree_item(&item).is_err());
    }

    #[test]
    fn test_corrupt_known_kind_is_an_error() {
        let item = TreeItem::with_tag(Hash256::ZERO, EntryKind::OFFER_TAG, &[1, 2]);
        assert!(LedgerEntry::from_tree_item(&item).is_err());
    }

    #[test]
    fn test_offer_index_depends_on_sequence() {
        let offer = |sequence| OfferEntry {
            account_id: account(4),
            sequence,
            taker_pays: Amount::native(10),
            taker_gets: Amount::issued(Currency::from_code("EUR").unwrap(), account(5), 3),
            expiration: 0,
            passive: false,
        };
        assert_ne!(offer(1).index(), offer(2).index());
    }
}

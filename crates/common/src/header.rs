//! Ledger headers and the last-closed-ledger marker payload.

use serde::{Deserialize, Serialize};

use crate::{Error, Hash256, Result};

/// Metadata of one closed ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHeader {
    /// Sequence number, starting at zero for the empty genesis ledger.
    pub ledger_seq: u32,
    /// Hash of the previous header.
    pub previous_ledger_hash: Hash256,
    /// Root hash of the state tree after this ledger.
    pub state_hash: Hash256,
    /// Close time in seconds.
    pub close_time: u64,
    pub total_coins: u64,
    /// Fees collected since the last inflation.
    pub fee_pool: u64,
    pub inflation_seq: u32,
    pub base_fee: u32,
    pub base_reserve: u32,
}

impl LedgerHeader {
    /// Header of the empty ledger a fresh node starts from.
    pub fn genesis() -> Self {
        Self {
            ledger_seq: 0,
            previous_ledger_hash: Hash256::ZERO,
            state_hash: Hash256::ZERO,
            close_time: 0,
            total_coins: 0,
            fee_pool: 0,
            inflation_seq: 0,
            base_fee: 10,
            base_reserve: 50_000_000,
        }
    }

    /// Builds the header that follows `self` with the given state root.
    pub fn next(&self, state_hash: Hash256, close_time: u64) -> Result<Self> {
        Ok(Self {
            ledger_seq: self.ledger_seq + 1,
            previous_ledger_hash: self.hash()?,
            state_hash,
            close_time,
            ..self.clone()
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// SHA-256 of the encoded header.
    pub fn hash(&self) -> Result<Hash256> {
        Ok(Hash256::hash(&self.to_bytes()?))
    }
}

/// Payload of the `lastClosedLedger` marker: the root hash followed by the
/// encoded header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastClosedLedger {
    pub root_hash: Hash256,
    pub header: LedgerHeader,
}

impl LastClosedLedger {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header = self.header.to_bytes()?;
        let mut out = Vec::with_capacity(32 + header.len());
        out.extend_from_slice(self.root_hash.as_bytes());
        out.extend_from_slice(&header);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 32 {
            return Err(Error::InvalidData(format!(
                "last closed ledger marker too short: {} bytes",
                bytes.len()
            )));
        }
        let (root, header) = bytes.split_at(32);
        let root_hash = Hash256::from_slice(root)
            .ok_or_else(|| Error::InvalidData("last closed ledger root".to_string()))?;
        Ok(Self {
            root_hash,
            header: LedgerHeader::from_bytes(header)?,
        })
    }
}

//! Raw items as stored in the state tree.
//!
//! An item is addressed by its index and carries an opaque byte payload. The
//! first two bytes of the payload are the big-endian kind tag; the rest is
//! the kind-specific body. The tree itself never looks inside the payload.

use crate::Hash256;

/// Length of the kind tag prefix.
pub const KIND_TAG_LEN: usize = 2;

/// One leaf of the state tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeItem {
    /// Content address of the entry this item holds.
    pub index: Hash256,
    /// Kind tag followed by the encoded body.
    pub data: Vec<u8>,
}

impl TreeItem {
    /// Creates an item from an index and its already-tagged payload.
    pub fn new(index: Hash256, data: Vec<u8>) -> Self {
        Self { index, data }
    }

    /// Builds an item by prefixing `body` with `kind_tag`.
    pub fn with_tag(index: Hash256, kind_tag: u16, body: &[u8]) -> Self {
        let mut data = Vec::with_capacity(KIND_TAG_LEN + body.len());
        data.extend_from_slice(&kind_tag.to_be_bytes());
        data.extend_from_slice(body);
        Self { index, data }
    }

    /// Returns the kind tag, or `None` if the payload is too short to hold one.
    pub fn kind_tag(&self) -> Option<u16> {
        let tag: [u8; KIND_TAG_LEN] = self.data.get(..KIND_TAG_LEN)?.try_into().ok()?;
        Some(u16::from_be_bytes(tag))
    }

    /// Returns the body following the kind tag.
    pub fn body(&self) -> &[u8] {
        self.data.get(KIND_TAG_LEN..).unwrap_or_default()
    }

    /// SHA-256 of the payload, used when committing the item into a tree root.
    pub fn data_hash(&self) -> Hash256 {
        Hash256::hash(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_tag_layout() {
        let item = TreeItem::with_tag(Hash256::ZERO, 0x0102, b"body");
        assert_eq!(&item.data[..2], &[0x01, 0x02]);
        assert_eq!(item.kind_tag(), Some(0x0102));
        assert_eq!(item.body(), b"body");
    }

    #[test]
    fn test_short_payload_has_no_tag() {
        let item = TreeItem::new(Hash256::ZERO, vec![0x61]);
        assert_eq!(item.kind_tag(), None);
        assert!(item.body().is_empty());
    }
}

//! Content addressing of ledger entries.
//!
//! Every entry kind shares one tree keyspace. An entry's index is the
//! SHA-512-half of its kind tag followed by its natural key fields, so two
//! kinds whose natural keys happen to have the same bytes still land on
//! different indexes.
//!
//! ```rust
//! use ledgersync_common::{content_address, EntryKind};
//!
//! let key = [7u8; 20];
//! let account = content_address(EntryKind::ACCOUNT_TAG, &[&key]);
//! let offer = content_address(EntryKind::OFFER_TAG, &[&key]);
//! assert_ne!(account, offer);
//! ```

use sha2::{Digest, Sha512};

use crate::Hash256;

/// SHA-512 over the concatenated chunks, truncated to the first 256 bits.
pub fn sha512_half(chunks: &[&[u8]]) -> Hash256 {
    let mut hasher = Sha512::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest[..32]);
    Hash256(bytes)
}

/// Computes the index of an entry from its kind tag and natural key fields.
///
/// The tag is hashed first as a big-endian `u16`. The function is pure: the
/// same inputs always give the same index, which is what makes re-importing
/// a ledger converge on the same rows.
pub fn content_address(kind_tag: u16, fields: &[&[u8]]) -> Hash256 {
    let tag = kind_tag.to_be_bytes();
    let mut chunks: Vec<&[u8]> = Vec::with_capacity(fields.len() + 1);
    chunks.push(&tag);
    chunks.extend_from_slice(fields);
    sha512_half(&chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntryKind;

    #[test]
    fn test_content_address_deterministic() {
        let a = content_address(EntryKind::ACCOUNT_TAG, &[b"alice"]);
        let b = content_address(EntryKind::ACCOUNT_TAG, &[b"alice"]);
        assert_eq!(a, b);
        assert_ne!(a, content_address(EntryKind::ACCOUNT_TAG, &[b"bob"]));
    }

    #[test]
    fn test_content_address_domain_separation() {
        let fields: [&[u8]; 2] = [&[1u8; 20], &[0, 0, 0, 5]];
        let tags = [
            EntryKind::ACCOUNT_TAG,
            EntryKind::TRUST_LINE_TAG,
            EntryKind::OFFER_TAG,
        ];
        for (i, a) in tags.iter().enumerate() {
            for b in &tags[i + 1..] {
                assert_ne!(content_address(*a, &fields), content_address(*b, &fields));
            }
        }
    }

    #[test]
    fn test_content_address_matches_tagged_sha512_half() {
        let tag = EntryKind::OFFER_TAG.to_be_bytes();
        let expected = sha512_half(&[&tag, b"key", b"fields"]);
        assert_eq!(
            content_address(EntryKind::OFFER_TAG, &[b"key", b"fields"]),
            expected
        );
    }
}

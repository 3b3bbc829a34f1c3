//! Key layout for persisted tree state
//!
//! ```text
//! tree:<id>:meta               -> TreeMeta bytes
//! tree:<id>:leaf:<index u64be> -> leaf bytes
//! tree:<id>:key:<fr>           -> concatenated u64be leaf indices
//! ```
//!
//! Indices are big-endian so a prefix scan returns leaves in index order.

use crate::types::MerkleTreeId;
use rollshrew_support::Fr;

pub const TREE_PREFIX: &[u8] = b"tree:";

#[inline]
pub fn make_tree_prefix(id: MerkleTreeId) -> Vec<u8> {
    let mut result = Vec::with_capacity(TREE_PREFIX.len() + 2);
    result.extend_from_slice(TREE_PREFIX);
    result.push(id.as_u8());
    result.push(b':');
    result
}

#[inline]
pub fn make_meta_key(id: MerkleTreeId) -> Vec<u8> {
    let mut result = make_tree_prefix(id);
    result.extend_from_slice(b"meta");
    result
}

#[inline]
pub fn make_leaf_prefix(id: MerkleTreeId) -> Vec<u8> {
    let mut result = make_tree_prefix(id);
    result.extend_from_slice(b"leaf:");
    result
}

#[inline]
pub fn make_leaf_key(id: MerkleTreeId, index: u64) -> Vec<u8> {
    let mut result = make_leaf_prefix(id);
    result.extend_from_slice(&index.to_be_bytes());
    result
}

#[inline]
pub fn make_index_key(id: MerkleTreeId, key: &Fr) -> Vec<u8> {
    let mut result = make_tree_prefix(id);
    result.extend_from_slice(b"key:");
    result.extend_from_slice(key.as_bytes());
    result
}

pub fn encode_indices(indices: &[u64]) -> Vec<u8> {
    indices.iter().flat_map(|i| i.to_be_bytes()).collect()
}

pub fn decode_indices(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            u64::from_be_bytes(buf)
        })
        .collect()
}

/// Leaf index from a full leaf key, if the key has the expected shape.
pub fn parse_leaf_index(id: MerkleTreeId, key: &[u8]) -> Option<u64> {
    let prefix = make_leaf_prefix(id);
    let suffix = key.strip_prefix(prefix.as_slice())?;
    let bytes: [u8; 8] = suffix.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_keys_sort_by_index() {
        let id = MerkleTreeId::NoteHashTree;
        assert!(make_leaf_key(id, 2) < make_leaf_key(id, 256));
        assert_eq!(parse_leaf_index(id, &make_leaf_key(id, 300)), Some(300));
        assert_eq!(parse_leaf_index(MerkleTreeId::Archive, &make_leaf_key(id, 300)), None);
    }

    #[test]
    fn test_indices_encoding() {
        assert_eq!(decode_indices(&encode_indices(&[1, 7, 1 << 40])), vec![1, 7, 1 << 40]);
    }
}

//! Leaf codec: how values become tree leaves
//!
//! Append-only trees store values that are already hashes, so an [`Fr`] is its
//! own leaf hash. Indexed trees store an [`IndexedLeafPreimage`]: the key/value
//! pair plus the pointer to the next larger key. The preimage is what gets
//! hashed into the tree, so pointer updates change the leaf hash.

use crate::error::{TreeError, TreeResult};
use crate::hasher::Hasher;
use rollshrew_support::utils::{consume_fr, consume_u64};
use rollshrew_support::Fr;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// A value that can occupy a leaf slot.
pub trait TreeLeaf: Clone + Send + Sync + 'static {
    fn leaf_hash<H: Hasher>(&self, hasher: &H) -> Fr;

    /// Key under which the leaf is found by value lookups.
    fn index_key(&self) -> Fr;

    fn to_bytes(&self) -> Vec<u8>;

    fn from_bytes(bytes: &[u8]) -> TreeResult<Self>;
}

impl TreeLeaf for Fr {
    fn leaf_hash<H: Hasher>(&self, _hasher: &H) -> Fr {
        *self
    }

    fn index_key(&self) -> Fr {
        *self
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> TreeResult<Self> {
        Fr::from_slice(bytes).map_err(|e| TreeError::Serialization(e.to_string()))
    }
}

/// Key/value pair stored in an indexed tree. A zero key is an empty leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IndexedLeaf {
    pub key: Fr,
    pub value: Fr,
}

impl IndexedLeaf {
    pub fn new(key: Fr, value: Fr) -> Self {
        Self { key, value }
    }

    /// A nullifier is a key with no value.
    pub fn nullifier(key: Fr) -> Self {
        Self { key, value: Fr::ZERO }
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_zero()
    }
}

/// An indexed leaf together with its successor pointer.
///
/// `next_key == 0 && next_index == 0` marks the leaf with the largest key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IndexedLeafPreimage {
    pub leaf: IndexedLeaf,
    pub next_key: Fr,
    pub next_index: u64,
}

impl IndexedLeafPreimage {
    pub const ENCODED_SIZE: usize = 32 * 3 + 8;

    pub fn new(leaf: IndexedLeaf, next_key: Fr, next_index: u64) -> Self {
        Self {
            leaf,
            next_key,
            next_index,
        }
    }

    pub fn key(&self) -> Fr {
        self.leaf.key
    }

    pub fn is_max(&self) -> bool {
        self.next_key.is_zero() && self.next_index == 0
    }

    pub fn with_next(self, next_key: Fr, next_index: u64) -> Self {
        Self {
            next_key,
            next_index,
            ..self
        }
    }

    pub fn with_value(self, value: Fr) -> Self {
        Self {
            leaf: IndexedLeaf::new(self.leaf.key, value),
            ..self
        }
    }
}

impl TreeLeaf for IndexedLeafPreimage {
    fn leaf_hash<H: Hasher>(&self, hasher: &H) -> Fr {
        hasher.hash_inputs(&[
            self.leaf.key.as_bytes(),
            self.leaf.value.as_bytes(),
            self.next_key.as_bytes(),
            &self.next_index.to_be_bytes(),
        ])
    }

    fn index_key(&self) -> Fr {
        self.leaf.key
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_SIZE);
        out.extend_from_slice(self.leaf.key.as_bytes());
        out.extend_from_slice(self.leaf.value.as_bytes());
        out.extend_from_slice(self.next_key.as_bytes());
        out.extend_from_slice(&self.next_index.to_be_bytes());
        out
    }

    fn from_bytes(bytes: &[u8]) -> TreeResult<Self> {
        if bytes.len() != Self::ENCODED_SIZE {
            return Err(TreeError::Serialization(format!(
                "indexed leaf preimage must be {} bytes, got {}",
                Self::ENCODED_SIZE,
                bytes.len()
            )));
        }
        let mut cursor = Cursor::new(bytes.to_vec());
        let decode = |cursor: &mut Cursor<Vec<u8>>| -> anyhow::Result<Self> {
            let key = consume_fr(cursor)?;
            let value = consume_fr(cursor)?;
            let next_key = consume_fr(cursor)?;
            let next_index = consume_u64(cursor)?;
            Ok(Self::new(IndexedLeaf::new(key, value), next_key, next_index))
        };
        decode(&mut cursor).map_err(|e| TreeError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Sha256Hasher;

    #[test]
    fn test_pointer_update_changes_hash() {
        let hasher = Sha256Hasher;
        let preimage = IndexedLeafPreimage::new(IndexedLeaf::nullifier(Fr::from(5)), Fr::ZERO, 0);
        let relinked = preimage.with_next(Fr::from(9), 3);
        assert!(preimage.is_max());
        assert!(!relinked.is_max());
        assert_ne!(preimage.leaf_hash(&hasher), relinked.leaf_hash(&hasher));
    }

    #[test]
    fn test_preimage_rejects_wrong_length() {
        assert!(IndexedLeafPreimage::from_bytes(&[0u8; 10]).is_err());
        let preimage = IndexedLeafPreimage::new(IndexedLeaf::new(Fr::from(1), Fr::from(2)), Fr::from(3), 4);
        assert_eq!(IndexedLeafPreimage::from_bytes(&preimage.to_bytes()).unwrap(), preimage);
    }
}

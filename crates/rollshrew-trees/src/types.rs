//! Tree identifiers, metadata and witness types

use crate::error::{TreeError, TreeResult};
use crate::hasher::Hasher;
use crate::leaf::{IndexedLeaf, IndexedLeafPreimage};
use rollshrew_support::utils::{consume_fr, consume_u64};
use rollshrew_support::Fr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

/// The trees making up the world state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MerkleTreeId {
    NullifierTree,
    NoteHashTree,
    PublicDataTree,
    L1ToL2MessageTree,
    Archive,
}

impl MerkleTreeId {
    pub const ALL: [MerkleTreeId; 5] = [
        MerkleTreeId::NullifierTree,
        MerkleTreeId::NoteHashTree,
        MerkleTreeId::PublicDataTree,
        MerkleTreeId::L1ToL2MessageTree,
        MerkleTreeId::Archive,
    ];

    pub fn as_u8(&self) -> u8 {
        match self {
            MerkleTreeId::NullifierTree => 0,
            MerkleTreeId::NoteHashTree => 1,
            MerkleTreeId::PublicDataTree => 2,
            MerkleTreeId::L1ToL2MessageTree => 3,
            MerkleTreeId::Archive => 4,
        }
    }

    pub fn from_u8(value: u8) -> TreeResult<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_u8() == value)
            .ok_or_else(|| TreeError::Serialization(format!("unknown tree id {}", value)))
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, MerkleTreeId::NullifierTree | MerkleTreeId::PublicDataTree)
    }
}

impl fmt::Display for MerkleTreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Root, size and depth of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeMeta {
    pub id: MerkleTreeId,
    pub depth: u8,
    pub size: u64,
    pub root: Fr,
}

impl TreeMeta {
    pub fn capacity(&self) -> u128 {
        1u128 << self.depth
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 8 + 32);
        out.push(self.id.as_u8());
        out.push(self.depth);
        out.extend_from_slice(&self.size.to_be_bytes());
        out.extend_from_slice(self.root.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> TreeResult<Self> {
        if bytes.len() != 42 {
            return Err(TreeError::Serialization(format!(
                "tree meta must be 42 bytes, got {}",
                bytes.len()
            )));
        }
        let id = MerkleTreeId::from_u8(bytes[0])?;
        let depth = bytes[1];
        let mut cursor = Cursor::new(bytes[2..].to_vec());
        let size = consume_u64(&mut cursor).map_err(|e| TreeError::Serialization(e.to_string()))?;
        let root = consume_fr(&mut cursor).map_err(|e| TreeError::Serialization(e.to_string()))?;
        Ok(Self {
            id,
            depth,
            size,
            root,
        })
    }
}

/// Sibling hashes from the leaf level up to just below the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiblingPath(pub Vec<Fr>);

impl SiblingPath {
    pub fn empty(depth: u8) -> Self {
        Self(vec![Fr::ZERO; depth as usize])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Recompute the root from a leaf hash sitting at `index`.
    pub fn compute_root<H: Hasher>(&self, leaf_hash: Fr, index: u64, hasher: &H) -> Fr {
        let mut current = leaf_hash;
        let mut position = index;
        for sibling in &self.0 {
            current = if position & 1 == 0 {
                hasher.combine(&current, sibling)
            } else {
                hasher.combine(sibling, &current)
            };
            position >>= 1;
        }
        current
    }

    /// The upper part of the path, starting above a subtree of `height`.
    pub fn subtree_path(&self, height: u8) -> SiblingPath {
        SiblingPath(self.0.iter().skip(height as usize).copied().collect())
    }
}

/// Leaf preimage, its index and a sibling path proving it in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafUpdateWitness {
    pub preimage: IndexedLeafPreimage,
    pub index: u64,
    pub sibling_path: SiblingPath,
}

impl LeafUpdateWitness {
    /// Placeholder witness for an empty input leaf.
    pub fn empty(depth: u8) -> Self {
        Self {
            preimage: IndexedLeafPreimage::default(),
            index: 0,
            sibling_path: SiblingPath::empty(depth),
        }
    }
}

/// Result of a predecessor search in an indexed tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowLeafLookup {
    pub index: u64,
    pub already_present: bool,
}

/// What an indexed tree does when a key is inserted a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateKeyPolicy {
    /// Fail with `DuplicateKey` (nullifier tree).
    Reject,
    /// Replace the stored value in place (public data tree).
    Upsert,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequentialInsertionResult {
    pub low_leaf_witness_data: Vec<LeafUpdateWitness>,
    pub insertion_witness_data: Vec<LeafUpdateWitness>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInsertionResult {
    /// One witness per input leaf, in sorted order.
    pub low_leaves_witness_data: Vec<LeafUpdateWitness>,
    /// Path from the new subtree's root to the tree root.
    pub new_subtree_sibling_path: SiblingPath,
    pub sorted_new_leaves: Vec<IndexedLeaf>,
    /// `sorted_new_leaves_indexes[i]` is the input position of `sorted_new_leaves[i]`.
    pub sorted_new_leaves_indexes: Vec<u32>,
}

//! Fixed-depth append-only Merkle tree

use crate::error::{TreeError, TreeResult};
use crate::hasher::Hasher;
use crate::layer::TreeLayer;
use crate::leaf::TreeLeaf;
use crate::types::{MerkleTreeId, SiblingPath, TreeMeta};
use log::debug;
use rollshrew_support::Fr;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const MAX_DEPTH: u8 = 64;

/// Binary Merkle tree filled left to right.
///
/// Writes land in a private top layer over the committed layers it was opened
/// on, so a tree obtained from [`AppendOnlyTree::from_committed`] is a cheap
/// fork: nothing below the top layer is ever mutated. The root is recomputed
/// eagerly after every write.
pub struct AppendOnlyTree<H: Hasher, L: TreeLeaf = Fr> {
    hasher: H,
    zero_hashes: Vec<Fr>,
    layer: TreeLayer<L>,
}

impl<H: Hasher, L: TreeLeaf> AppendOnlyTree<H, L> {
    pub fn new(id: MerkleTreeId, depth: u8, hasher: H) -> TreeResult<Self> {
        if depth == 0 || depth > MAX_DEPTH {
            return Err(TreeError::InvalidDepth(depth));
        }
        let zero_hashes = hasher.zero_hashes(depth);
        let meta = TreeMeta {
            id,
            depth,
            size: 0,
            root: zero_hashes[depth as usize],
        };
        Ok(Self {
            hasher,
            zero_hashes,
            layer: TreeLayer::root_layer(meta),
        })
    }

    /// Open a writable view on top of a committed layer.
    pub fn from_committed(base: Arc<TreeLayer<L>>, hasher: H) -> Self {
        let zero_hashes = hasher.zero_hashes(base.meta().depth);
        Self {
            hasher,
            zero_hashes,
            layer: TreeLayer::child(base),
        }
    }

    /// Rebuild a tree from a full set of leaves, e.g. when loading from disk.
    pub fn from_leaves(meta: TreeMeta, leaves: Vec<(u64, L)>, hasher: H) -> TreeResult<Self> {
        let mut tree = Self::new(meta.id, meta.depth, hasher)?;
        let mut dirty = BTreeSet::new();
        for (index, leaf) in leaves {
            if index >= meta.size {
                return Err(TreeError::InvalidState(format!(
                    "leaf {} stored beyond tree size {}",
                    index, meta.size
                )));
            }
            tree.write_leaf(index, leaf, true);
            dirty.insert(index);
        }
        tree.layer.meta.size = meta.size;
        tree.rehash(dirty);
        if tree.root() != meta.root {
            return Err(TreeError::InvalidState(format!(
                "rebuilt root {} does not match stored root {} for {}",
                tree.root(),
                meta.root,
                meta.id
            )));
        }
        Ok(tree)
    }

    /// Freeze the accumulated writes into a shareable layer.
    pub fn commit(self, max_chain: usize) -> Arc<TreeLayer<L>> {
        self.layer.freeze(max_chain)
    }

    pub fn layer(&self) -> &TreeLayer<L> {
        &self.layer
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    pub fn meta(&self) -> TreeMeta {
        self.layer.meta
    }

    pub fn id(&self) -> MerkleTreeId {
        self.layer.meta.id
    }

    pub fn root(&self) -> Fr {
        self.layer.meta.root
    }

    pub fn size(&self) -> u64 {
        self.layer.meta.size
    }

    pub fn depth(&self) -> u8 {
        self.layer.meta.depth
    }

    pub fn capacity(&self) -> u128 {
        self.layer.meta.capacity()
    }

    /// Fail with `TreeFull` unless `count` more slots fit after `from`.
    pub(crate) fn ensure_capacity(&self, from: u64, count: u64) -> TreeResult<()> {
        if from as u128 + count as u128 > self.capacity() {
            return Err(TreeError::TreeFull {
                capacity: self.capacity(),
                size: self.size(),
                requested: count,
            });
        }
        Ok(())
    }

    /// Append leaves at the next free indices, in order.
    pub fn append(&mut self, leaves: &[L]) -> TreeResult<()> {
        if leaves.is_empty() {
            return Ok(());
        }
        let start = self.size();
        self.ensure_capacity(start, leaves.len() as u64)?;
        let slots = leaves
            .iter()
            .cloned()
            .enumerate()
            .map(|(offset, leaf)| (start + offset as u64, leaf))
            .collect();
        self.write_slots(slots, start + leaves.len() as u64);
        debug!(
            "{}: appended {} leaves, size now {}",
            self.id(),
            leaves.len(),
            self.size()
        );
        Ok(())
    }

    /// Write the given slots and grow the tree to `end`. Slots below `end`
    /// that are not given stay empty. The caller has already checked capacity.
    pub(crate) fn write_slots(&mut self, slots: BTreeMap<u64, L>, end: u64) {
        let mut dirty = BTreeSet::new();
        for (index, leaf) in slots {
            self.write_leaf(index, leaf, true);
            dirty.insert(index);
        }
        if end > self.layer.meta.size {
            self.layer.meta.size = end;
        }
        self.rehash(dirty);
    }

    /// Replace the leaf at an existing index, keeping its index entry.
    pub(crate) fn update_leaf(&mut self, index: u64, leaf: L) {
        self.write_leaf(index, leaf, false);
        self.rehash(BTreeSet::from([index]));
    }

    fn write_leaf(&mut self, index: u64, leaf: L, new_slot: bool) {
        let hash = leaf.leaf_hash(&self.hasher);
        if new_slot {
            self.layer.index.entry(leaf.index_key()).or_default().push(index);
        }
        self.layer.leaves.insert(index, leaf);
        self.layer.nodes.insert((0, index), hash);
    }

    fn rehash(&mut self, mut dirty: BTreeSet<u64>) {
        let depth = self.depth();
        for height in 0..depth {
            let parents: BTreeSet<u64> = dirty.iter().map(|index| index >> 1).collect();
            for parent in &parents {
                let left = self.node(height, parent << 1);
                let right = self.node(height, (parent << 1) | 1);
                let hash = self.hasher.combine(&left, &right);
                self.layer.nodes.insert((height + 1, *parent), hash);
            }
            dirty = parents;
        }
        self.layer.meta.root = self.node(depth, 0);
    }

    fn node(&self, height: u8, index: u64) -> Fr {
        self.layer
            .node((height, index))
            .unwrap_or(self.zero_hashes[height as usize])
    }

    pub fn get_sibling_path(&self, index: u64) -> TreeResult<SiblingPath> {
        self.check_index(index)?;
        Ok(self.sibling_path_unchecked(index))
    }

    /// Path for any slot below capacity, filled or not.
    pub(crate) fn sibling_path_unchecked(&self, index: u64) -> SiblingPath {
        let mut path = Vec::with_capacity(self.depth() as usize);
        let mut position = index;
        for height in 0..self.depth() {
            path.push(self.node(height, position ^ 1));
            position >>= 1;
        }
        SiblingPath(path)
    }

    /// Leaf at `index`; `None` for an empty slot inside the filled range.
    pub fn get_leaf(&self, index: u64) -> TreeResult<Option<L>> {
        self.check_index(index)?;
        Ok(self.layer.leaf(index).cloned())
    }

    pub fn leaf_hash_at(&self, index: u64) -> TreeResult<Fr> {
        self.check_index(index)?;
        Ok(self.node(0, index))
    }

    /// All indices holding a leaf with this index key.
    pub fn find_leaf_indices(&self, value: &Fr) -> Vec<u64> {
        self.layer.indices_of(value)
    }

    pub fn find_leaf_index_after(&self, value: &Fr, start: u64) -> Option<u64> {
        self.find_leaf_indices(value)
            .into_iter()
            .find(|index| *index >= start)
    }

    fn check_index(&self, index: u64) -> TreeResult<()> {
        if index >= self.size() {
            return Err(TreeError::IndexOutOfRange {
                index,
                size: self.size(),
            });
        }
        Ok(())
    }
}

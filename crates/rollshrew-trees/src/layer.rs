//! Copy-on-write storage for tree nodes and leaves
//!
//! A [`TreeLayer`] records the nodes, leaves and value-index entries written
//! on top of an optional parent layer. Committed layers are frozen behind an
//! `Arc` and shared by every reader and fork built on them; a fork only ever
//! writes into its own top layer. Reads walk the chain from the top down and
//! fall back to the empty-subtree hashes when nothing was ever written.
//!
//! Leaves are never removed, so a missing entry in every layer means an empty
//! slot and no tombstones are needed.

use crate::leaf::TreeLeaf;
use crate::types::TreeMeta;
use rollshrew_support::Fr;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// (height above the leaves, index at that height)
pub type NodeKey = (u8, u64);

#[derive(Debug)]
pub struct TreeLayer<L> {
    parent: Option<Arc<TreeLayer<L>>>,
    chain_len: usize,
    pub(crate) meta: TreeMeta,
    pub(crate) nodes: HashMap<NodeKey, Fr>,
    pub(crate) leaves: HashMap<u64, L>,
    pub(crate) index: BTreeMap<Fr, Vec<u64>>,
}

impl<L: TreeLeaf> TreeLayer<L> {
    pub fn root_layer(meta: TreeMeta) -> Self {
        Self {
            parent: None,
            chain_len: 1,
            meta,
            nodes: HashMap::new(),
            leaves: HashMap::new(),
            index: BTreeMap::new(),
        }
    }

    /// An empty layer on top of `parent`.
    pub fn child(parent: Arc<TreeLayer<L>>) -> Self {
        Self {
            meta: parent.meta,
            chain_len: parent.chain_len + 1,
            parent: Some(parent),
            nodes: HashMap::new(),
            leaves: HashMap::new(),
            index: BTreeMap::new(),
        }
    }

    pub fn meta(&self) -> TreeMeta {
        self.meta
    }

    pub fn chain_len(&self) -> usize {
        self.chain_len
    }

    /// Whether this layer holds no writes of its own.
    pub fn is_clean(&self) -> bool {
        self.leaves.is_empty() && self.nodes.is_empty() && self.meta == self.parent_meta()
    }

    fn parent_meta(&self) -> TreeMeta {
        self.parent.as_ref().map(|p| p.meta).unwrap_or(self.meta)
    }

    fn chain(&self) -> impl Iterator<Item = &TreeLayer<L>> {
        std::iter::successors(Some(self), |layer| layer.parent.as_deref())
    }

    pub fn node(&self, key: NodeKey) -> Option<Fr> {
        self.chain().find_map(|layer| layer.nodes.get(&key).copied())
    }

    pub fn leaf(&self, index: u64) -> Option<&L> {
        self.chain().find_map(|layer| layer.leaves.get(&index))
    }

    /// Every index under which `key` was appended, ascending.
    pub fn indices_of(&self, key: &Fr) -> Vec<u64> {
        let mut indices: Vec<u64> = self
            .chain()
            .filter_map(|layer| layer.index.get(key))
            .flatten()
            .copied()
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Largest indexed key `<= key` and the first index it was stored at.
    pub fn floor(&self, key: &Fr) -> Option<(Fr, u64)> {
        self.chain()
            .filter_map(|layer| {
                layer
                    .index
                    .range(..=*key)
                    .next_back()
                    .and_then(|(k, indices)| indices.first().map(|i| (*k, *i)))
            })
            .max_by_key(|(k, _)| *k)
    }

    /// Collapse the whole chain into one parentless layer.
    pub fn flatten(&self) -> TreeLayer<L> {
        let layers: Vec<&TreeLayer<L>> = self.chain().collect();
        let mut flat = TreeLayer::root_layer(self.meta);
        for layer in layers.into_iter().rev() {
            flat.nodes.extend(layer.nodes.iter().map(|(k, v)| (*k, *v)));
            flat.leaves.extend(layer.leaves.iter().map(|(k, v)| (*k, v.clone())));
            for (key, indices) in &layer.index {
                let entry = flat.index.entry(*key).or_default();
                entry.extend(indices.iter().copied());
            }
        }
        for indices in flat.index.values_mut() {
            indices.sort_unstable();
            indices.dedup();
        }
        flat
    }

    /// Freeze this layer, flattening it when the chain grew past `max_chain`.
    pub fn freeze(self, max_chain: usize) -> Arc<TreeLayer<L>> {
        if self.chain_len > max_chain.max(1) {
            Arc::new(self.flatten())
        } else {
            Arc::new(self)
        }
    }

    /// All leaves visible through the chain, ordered by index.
    pub fn all_leaves(&self) -> BTreeMap<u64, L> {
        let layers: Vec<&TreeLayer<L>> = self.chain().collect();
        let mut leaves = BTreeMap::new();
        for layer in layers.into_iter().rev() {
            leaves.extend(layer.leaves.iter().map(|(k, v)| (*k, v.clone())));
        }
        leaves
    }

    /// Leaves written in this layer only.
    pub fn own_leaves(&self) -> impl Iterator<Item = (&u64, &L)> {
        self.leaves.iter()
    }

    /// Keys whose index entries changed in this layer only.
    pub fn own_index_keys(&self) -> impl Iterator<Item = &Fr> {
        self.index.keys()
    }
}

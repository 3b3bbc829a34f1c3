//! Indexed Merkle tree
//!
//! Leaves form a linked list sorted by key: every preimage points at the leaf
//! holding the next larger key, and the largest key points at `(0, 0)`. The
//! links are plain leaf indices into the append-only arena underneath, so
//! inserting a key between two others touches exactly one existing leaf (its
//! low leaf) plus the appended slot.
//!
//! Key zero is reserved. The leaf holding key zero sits at index 0 from
//! initialisation on, which guarantees every non-zero key has a low leaf.

use crate::append_only::AppendOnlyTree;
use crate::error::{TreeError, TreeResult};
use crate::hasher::Hasher;
use crate::layer::TreeLayer;
use crate::leaf::{IndexedLeaf, IndexedLeafPreimage};
use crate::types::{
    BatchInsertionResult, DuplicateKeyPolicy, LeafUpdateWitness, LowLeafLookup, MerkleTreeId,
    SequentialInsertionResult, SiblingPath, TreeMeta,
};
use itertools::Itertools;
use log::debug;
use rollshrew_support::Fr;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

pub struct IndexedTree<H: Hasher> {
    tree: AppendOnlyTree<H, IndexedLeafPreimage>,
    policy: DuplicateKeyPolicy,
}

impl<H: Hasher> IndexedTree<H> {
    /// Create a tree prefilled with keys `0..initial_size`, linked in order.
    pub fn new(
        id: MerkleTreeId,
        depth: u8,
        initial_size: u64,
        policy: DuplicateKeyPolicy,
        hasher: H,
    ) -> TreeResult<Self> {
        let mut tree = AppendOnlyTree::new(id, depth, hasher)?;
        let initial_size = initial_size.max(1);
        tree.ensure_capacity(0, initial_size)?;
        let prefill: Vec<IndexedLeafPreimage> = (0..initial_size)
            .map(|i| {
                let (next_key, next_index) = if i + 1 == initial_size {
                    (Fr::ZERO, 0)
                } else {
                    (Fr::from(i + 1), i + 1)
                };
                IndexedLeafPreimage::new(IndexedLeaf::nullifier(Fr::from(i)), next_key, next_index)
            })
            .collect();
        tree.append(&prefill)?;
        Ok(Self { tree, policy })
    }

    pub fn from_committed(
        base: Arc<TreeLayer<IndexedLeafPreimage>>,
        policy: DuplicateKeyPolicy,
        hasher: H,
    ) -> Self {
        Self {
            tree: AppendOnlyTree::from_committed(base, hasher),
            policy,
        }
    }

    pub fn from_tree(tree: AppendOnlyTree<H, IndexedLeafPreimage>, policy: DuplicateKeyPolicy) -> Self {
        Self { tree, policy }
    }

    pub fn commit(self, max_chain: usize) -> Arc<TreeLayer<IndexedLeafPreimage>> {
        self.tree.commit(max_chain)
    }

    pub fn inner(&self) -> &AppendOnlyTree<H, IndexedLeafPreimage> {
        &self.tree
    }

    pub fn policy(&self) -> DuplicateKeyPolicy {
        self.policy
    }

    pub fn meta(&self) -> TreeMeta {
        self.tree.meta()
    }

    pub fn root(&self) -> Fr {
        self.tree.root()
    }

    pub fn size(&self) -> u64 {
        self.tree.size()
    }

    pub fn depth(&self) -> u8 {
        self.tree.depth()
    }

    pub fn get_sibling_path(&self, index: u64) -> TreeResult<SiblingPath> {
        self.tree.get_sibling_path(index)
    }

    pub fn get_leaf_preimage(&self, index: u64) -> TreeResult<Option<IndexedLeafPreimage>> {
        self.tree.get_leaf(index)
    }

    pub fn find_leaf_index(&self, key: &Fr) -> Option<u64> {
        self.tree.find_leaf_indices(key).first().copied()
    }

    /// The leaf holding `key`, or the largest key below it.
    pub fn find_low_leaf(&self, key: &Fr) -> TreeResult<LowLeafLookup> {
        let (found, index) = self
            .tree
            .layer()
            .floor(key)
            .ok_or_else(|| TreeError::InvalidState(format!("{} has no zero leaf", self.tree.id())))?;
        Ok(LowLeafLookup {
            index,
            already_present: found == *key,
        })
    }

    fn preimage_at(&self, index: u64) -> TreeResult<IndexedLeafPreimage> {
        self.tree.get_leaf(index)?.ok_or_else(|| {
            TreeError::InvalidState(format!("{}: linked leaf {} is empty", self.tree.id(), index))
        })
    }

    fn witness(&self, preimage: IndexedLeafPreimage, index: u64) -> LeafUpdateWitness {
        LeafUpdateWitness {
            preimage,
            index,
            sibling_path: self.tree.sibling_path_unchecked(index),
        }
    }

    /// Count the leaves that will take a new slot, failing on forbidden duplicates.
    fn count_new_keys<'a>(&self, keys: impl Iterator<Item = &'a Fr>) -> TreeResult<u64> {
        let mut seen = HashSet::new();
        let mut new_keys = 0u64;
        for key in keys.filter(|k| !k.is_zero()) {
            let present = self.find_leaf_index(key).is_some();
            let repeated = !seen.insert(*key);
            if (present || repeated) && self.policy == DuplicateKeyPolicy::Reject {
                return Err(TreeError::DuplicateKey { key: *key });
            }
            if !present && !repeated {
                new_keys += 1;
            }
        }
        Ok(new_keys)
    }

    /// Insert leaves one at a time in input order.
    ///
    /// Empty leaves are skipped and produce no witnesses. All duplicate and
    /// capacity checks run first, so an error leaves the tree unchanged.
    pub fn insert_sequential(&mut self, leaves: &[IndexedLeaf]) -> TreeResult<SequentialInsertionResult> {
        let new_keys = self.count_new_keys(leaves.iter().map(|l| &l.key))?;
        self.tree.ensure_capacity(self.size(), new_keys)?;

        let mut result = SequentialInsertionResult::default();
        for leaf in leaves.iter().filter(|l| !l.is_empty()) {
            let low = self.find_low_leaf(&leaf.key)?;
            let low_preimage = self.preimage_at(low.index)?;
            result
                .low_leaf_witness_data
                .push(self.witness(low_preimage, low.index));

            if low.already_present {
                let updated = low_preimage.with_value(leaf.value);
                self.tree.update_leaf(low.index, updated);
                result
                    .insertion_witness_data
                    .push(self.witness(updated, low.index));
                continue;
            }

            let new_index = self.size();
            let new_preimage =
                IndexedLeafPreimage::new(*leaf, low_preimage.next_key, low_preimage.next_index);
            self.tree
                .update_leaf(low.index, low_preimage.with_next(leaf.key, new_index));
            self.tree.append(&[new_preimage])?;
            result
                .insertion_witness_data
                .push(self.witness(new_preimage, new_index));
        }
        debug!(
            "{}: sequential insert of {} leaves, size now {}",
            self.tree.id(),
            leaves.len(),
            self.size()
        );
        Ok(result)
    }

    /// Insert a batch as one aligned subtree of height `subtree_height`.
    ///
    /// Leaves are processed in descending key order, ties broken by input
    /// position, and leaf `i` of the input lands at `start + i` where `start`
    /// is the next `2^subtree_height`-aligned index. Each low-leaf witness is
    /// taken against the tree as left by the previous low-leaf update, which
    /// is what a circuit replaying the updates in sorted order sees.
    pub fn batch_insert(&mut self, leaves: &[IndexedLeaf], subtree_height: u8) -> TreeResult<BatchInsertionResult> {
        if subtree_height > self.depth() {
            return Err(TreeError::InvalidBatch(format!(
                "subtree height {} exceeds tree depth {}",
                subtree_height,
                self.depth()
            )));
        }
        if u32::from(subtree_height) >= u64::BITS {
            return Err(TreeError::InvalidBatch(format!(
                "subtree height {} is too large",
                subtree_height
            )));
        }
        let subtree_size = 1u64 << subtree_height;
        if leaves.len() as u64 > subtree_size {
            return Err(TreeError::InvalidBatch(format!(
                "{} leaves do not fit a subtree of height {}",
                leaves.len(),
                subtree_height
            )));
        }
        let start = self.size().div_ceil(subtree_size) * subtree_size;
        self.tree.ensure_capacity(start, subtree_size)?;
        let end = start.checked_add(subtree_size).ok_or(TreeError::TreeFull {
            capacity: self.tree.capacity(),
            size: self.size(),
            requested: subtree_size,
        })?;

        let sorted: Vec<(usize, IndexedLeaf)> = leaves
            .iter()
            .copied()
            .enumerate()
            .sorted_by(|(ia, a), (ib, b)| b.key.cmp(&a.key).then(ia.cmp(ib)))
            .collect();
        self.count_new_keys(sorted.iter().map(|(_, l)| &l.key))?;

        let depth = self.depth();
        // New leaves by input position; positions left out stay empty.
        let mut pending: BTreeMap<usize, IndexedLeafPreimage> = BTreeMap::new();
        // Keys already placed in this batch, by input position.
        let mut batch_keys: BTreeMap<Fr, usize> = BTreeMap::new();
        let mut low_leaves_witness_data = Vec::with_capacity(sorted.len());

        for (position, leaf) in &sorted {
            if leaf.is_empty() {
                low_leaves_witness_data.push(LeafUpdateWitness::empty(depth));
                continue;
            }

            // Repeated key within the batch (upsert only): update the pending leaf.
            if let Some(&slot) = batch_keys.get(&leaf.key) {
                let index = start + slot as u64;
                let current = pending.get(&slot).copied().ok_or_else(|| {
                    TreeError::InvalidState(format!("pending slot {} lost its leaf", slot))
                })?;
                low_leaves_witness_data.push(self.witness(current, index));
                pending.insert(slot, current.with_value(leaf.value));
                continue;
            }

            let low = self.find_low_leaf(&leaf.key)?;
            let low_preimage = self.preimage_at(low.index)?;
            low_leaves_witness_data.push(self.witness(low_preimage, low.index));

            if low.already_present {
                self.tree
                    .update_leaf(low.index, low_preimage.with_value(leaf.value));
                continue;
            }

            let new_index = start + *position as u64;
            self.tree
                .update_leaf(low.index, low_preimage.with_next(leaf.key, new_index));
            pending.insert(
                *position,
                IndexedLeafPreimage::new(*leaf, low_preimage.next_key, low_preimage.next_index),
            );
            batch_keys.insert(leaf.key, *position);
        }

        let new_subtree_sibling_path = self
            .tree
            .sibling_path_unchecked(start)
            .subtree_path(subtree_height);

        let slots = pending
            .into_iter()
            .map(|(position, preimage)| (start + position as u64, preimage))
            .collect();
        self.tree.write_slots(slots, end);

        debug!(
            "{}: batch inserted {} leaves at {}..{}",
            self.tree.id(),
            leaves.len(),
            start,
            end
        );

        Ok(BatchInsertionResult {
            low_leaves_witness_data,
            new_subtree_sibling_path,
            sorted_new_leaves: sorted.iter().map(|(_, l)| *l).collect(),
            sorted_new_leaves_indexes: sorted.iter().map(|(i, _)| *i as u32).collect(),
        })
    }

    /// Walk the linked list from key zero, returning `(key, index)` pairs.
    pub fn walk_keys(&self) -> TreeResult<Vec<(Fr, u64)>> {
        let mut visited = Vec::new();
        let mut index = 0u64;
        loop {
            let preimage = self.preimage_at(index)?;
            visited.push((preimage.key(), index));
            if preimage.is_max() {
                return Ok(visited);
            }
            if visited.len() as u64 > self.size() {
                return Err(TreeError::InvalidState(format!(
                    "{}: linked list does not terminate",
                    self.tree.id()
                )));
            }
            index = preimage.next_index;
        }
    }
}

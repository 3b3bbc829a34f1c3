//! The five state trees of the rollup, addressed by `MerkleTreeId`

use crate::config::WorldStateConfig;
use crate::error::{WorldStateError, WorldStateResult};
use log::debug;
use rollshrew_support::Fr;
use rollshrew_trees::persist::{load_tree, stage_full_rewrite, stage_layer};
use rollshrew_trees::{
    AppendOnlyTree, BatchInsertionResult, DuplicateKeyPolicy, Hasher, IndexedLeaf,
    IndexedLeafPreimage, IndexedTree, KeyValueStoreLike, LowLeafLookup, MerkleTreeId,
    SequentialInsertionResult, SiblingPath, TreeLayer, TreeMeta,
};
use std::sync::Arc;

/// Frozen layers of all five trees at one committed block.
#[derive(Clone)]
pub struct TreeSnapshot {
    pub(crate) block_number: u32,
    pub(crate) generation: u64,
    note_hash: Arc<TreeLayer<Fr>>,
    nullifier: Arc<TreeLayer<IndexedLeafPreimage>>,
    public_data: Arc<TreeLayer<IndexedLeafPreimage>>,
    l1_to_l2: Arc<TreeLayer<Fr>>,
    archive: Arc<TreeLayer<Fr>>,
}

impl TreeSnapshot {
    pub fn block_number(&self) -> u32 {
        self.block_number
    }

    pub fn meta(&self, id: MerkleTreeId) -> TreeMeta {
        match id {
            MerkleTreeId::NoteHashTree => self.note_hash.meta(),
            MerkleTreeId::NullifierTree => self.nullifier.meta(),
            MerkleTreeId::PublicDataTree => self.public_data.meta(),
            MerkleTreeId::L1ToL2MessageTree => self.l1_to_l2.meta(),
            MerkleTreeId::Archive => self.archive.meta(),
        }
    }

    /// Stage a full rewrite of every tree so the store matches this snapshot.
    pub(crate) fn stage_full_rewrite<S: KeyValueStoreLike>(
        &self,
        store: &S,
        batch: &mut S::Batch,
    ) -> WorldStateResult<()> {
        stage_full_rewrite(store, &*self.note_hash, batch)?;
        stage_full_rewrite(store, &*self.nullifier, batch)?;
        stage_full_rewrite(store, &*self.public_data, batch)?;
        stage_full_rewrite(store, &*self.l1_to_l2, batch)?;
        stage_full_rewrite(store, &*self.archive, batch)?;
        Ok(())
    }
}

enum TreeRef<'a, H: Hasher> {
    Append(&'a AppendOnlyTree<H>),
    Indexed(&'a IndexedTree<H>),
}

/// Writable view over the five trees.
///
/// Every operation takes the tree id and fails with `UnsupportedOperation`
/// when the tree kind does not support it (appends on the indexed trees,
/// low-leaf lookups on the append-only ones).
pub struct TreeSet<H: Hasher> {
    note_hash: AppendOnlyTree<H>,
    nullifier: IndexedTree<H>,
    public_data: IndexedTree<H>,
    l1_to_l2: AppendOnlyTree<H>,
    archive: AppendOnlyTree<H>,
}

impl<H: Hasher> TreeSet<H> {
    /// Empty trees with the indexed trees prefilled, before the genesis
    /// header is appended to the archive.
    pub(crate) fn empty(config: &WorldStateConfig, hasher: &H) -> WorldStateResult<Self> {
        Ok(Self {
            note_hash: AppendOnlyTree::new(
                MerkleTreeId::NoteHashTree,
                config.note_hash_tree_depth,
                hasher.clone(),
            )?,
            nullifier: IndexedTree::new(
                MerkleTreeId::NullifierTree,
                config.nullifier_tree_depth,
                config.initial_nullifier_tree_size,
                DuplicateKeyPolicy::Reject,
                hasher.clone(),
            )?,
            public_data: IndexedTree::new(
                MerkleTreeId::PublicDataTree,
                config.public_data_tree_depth,
                config.initial_public_data_tree_size,
                DuplicateKeyPolicy::Upsert,
                hasher.clone(),
            )?,
            l1_to_l2: AppendOnlyTree::new(
                MerkleTreeId::L1ToL2MessageTree,
                config.l1_to_l2_message_tree_depth,
                hasher.clone(),
            )?,
            archive: AppendOnlyTree::new(
                MerkleTreeId::Archive,
                config.archive_tree_depth,
                hasher.clone(),
            )?,
        })
    }

    /// Open a private writable view on top of a committed snapshot.
    pub(crate) fn open(snapshot: &TreeSnapshot, hasher: &H) -> Self {
        Self {
            note_hash: AppendOnlyTree::from_committed(snapshot.note_hash.clone(), hasher.clone()),
            nullifier: IndexedTree::from_committed(
                snapshot.nullifier.clone(),
                DuplicateKeyPolicy::Reject,
                hasher.clone(),
            ),
            public_data: IndexedTree::from_committed(
                snapshot.public_data.clone(),
                DuplicateKeyPolicy::Upsert,
                hasher.clone(),
            ),
            l1_to_l2: AppendOnlyTree::from_committed(snapshot.l1_to_l2.clone(), hasher.clone()),
            archive: AppendOnlyTree::from_committed(snapshot.archive.clone(), hasher.clone()),
        }
    }

    /// Rebuild all five trees from a store. `None` if nothing was persisted.
    pub(crate) fn load<S: KeyValueStoreLike>(store: &S, hasher: &H) -> WorldStateResult<Option<Self>> {
        let note_hash = load_tree(store, MerkleTreeId::NoteHashTree, hasher.clone())?;
        let nullifier = load_tree(store, MerkleTreeId::NullifierTree, hasher.clone())?;
        let public_data = load_tree(store, MerkleTreeId::PublicDataTree, hasher.clone())?;
        let l1_to_l2 = load_tree(store, MerkleTreeId::L1ToL2MessageTree, hasher.clone())?;
        let archive = load_tree(store, MerkleTreeId::Archive, hasher.clone())?;
        match (note_hash, nullifier, public_data, l1_to_l2, archive) {
            (Some(note_hash), Some(nullifier), Some(public_data), Some(l1_to_l2), Some(archive)) => {
                Ok(Some(Self {
                    note_hash,
                    nullifier: IndexedTree::from_tree(nullifier, DuplicateKeyPolicy::Reject),
                    public_data: IndexedTree::from_tree(public_data, DuplicateKeyPolicy::Upsert),
                    l1_to_l2,
                    archive,
                }))
            }
            (None, None, None, None, None) => Ok(None),
            _ => Err(WorldStateError::Storage(
                "store holds only part of the world state trees".to_string(),
            )),
        }
    }

    /// Stage this view's own writes, leaving the committed parents alone.
    pub(crate) fn stage_writes<B: rollshrew_trees::BatchLike>(&self, batch: &mut B) {
        stage_layer(self.note_hash.layer(), batch);
        stage_layer(self.nullifier.inner().layer(), batch);
        stage_layer(self.public_data.inner().layer(), batch);
        stage_layer(self.l1_to_l2.layer(), batch);
        stage_layer(self.archive.layer(), batch);
    }

    pub(crate) fn freeze(self, block_number: u32, generation: u64, max_chain: usize) -> TreeSnapshot {
        debug!(
            "Freezing tree set for block {} (generation {})",
            block_number, generation
        );
        TreeSnapshot {
            block_number,
            generation,
            note_hash: self.note_hash.commit(max_chain),
            nullifier: self.nullifier.commit(max_chain),
            public_data: self.public_data.commit(max_chain),
            l1_to_l2: self.l1_to_l2.commit(max_chain),
            archive: self.archive.commit(max_chain),
        }
    }

    fn tree(&self, id: MerkleTreeId) -> TreeRef<'_, H> {
        match id {
            MerkleTreeId::NoteHashTree => TreeRef::Append(&self.note_hash),
            MerkleTreeId::NullifierTree => TreeRef::Indexed(&self.nullifier),
            MerkleTreeId::PublicDataTree => TreeRef::Indexed(&self.public_data),
            MerkleTreeId::L1ToL2MessageTree => TreeRef::Append(&self.l1_to_l2),
            MerkleTreeId::Archive => TreeRef::Append(&self.archive),
        }
    }

    fn append_only_mut(
        &mut self,
        id: MerkleTreeId,
        operation: &'static str,
    ) -> WorldStateResult<&mut AppendOnlyTree<H>> {
        match id {
            MerkleTreeId::NoteHashTree => Ok(&mut self.note_hash),
            MerkleTreeId::L1ToL2MessageTree => Ok(&mut self.l1_to_l2),
            MerkleTreeId::Archive => Ok(&mut self.archive),
            tree => Err(WorldStateError::UnsupportedOperation { tree, operation }),
        }
    }

    fn indexed_mut(
        &mut self,
        id: MerkleTreeId,
        operation: &'static str,
    ) -> WorldStateResult<&mut IndexedTree<H>> {
        match id {
            MerkleTreeId::NullifierTree => Ok(&mut self.nullifier),
            MerkleTreeId::PublicDataTree => Ok(&mut self.public_data),
            tree => Err(WorldStateError::UnsupportedOperation { tree, operation }),
        }
    }

    fn indexed(&self, id: MerkleTreeId, operation: &'static str) -> WorldStateResult<&IndexedTree<H>> {
        match self.tree(id) {
            TreeRef::Indexed(tree) => Ok(tree),
            TreeRef::Append(_) => Err(WorldStateError::UnsupportedOperation { tree: id, operation }),
        }
    }

    pub fn get_tree_info(&self, id: MerkleTreeId) -> TreeMeta {
        match self.tree(id) {
            TreeRef::Append(tree) => tree.meta(),
            TreeRef::Indexed(tree) => tree.meta(),
        }
    }

    pub fn get_sibling_path(&self, id: MerkleTreeId, index: u64) -> WorldStateResult<SiblingPath> {
        let path = match self.tree(id) {
            TreeRef::Append(tree) => tree.get_sibling_path(index)?,
            TreeRef::Indexed(tree) => tree.get_sibling_path(index)?,
        };
        Ok(path)
    }

    /// Leaf value of an append-only tree.
    pub fn get_leaf_value(&self, id: MerkleTreeId, index: u64) -> WorldStateResult<Option<Fr>> {
        match self.tree(id) {
            TreeRef::Append(tree) => Ok(tree.get_leaf(index)?),
            TreeRef::Indexed(_) => Err(WorldStateError::UnsupportedOperation {
                tree: id,
                operation: "get_leaf_value",
            }),
        }
    }

    pub fn get_leaf_preimage(
        &self,
        id: MerkleTreeId,
        index: u64,
    ) -> WorldStateResult<Option<IndexedLeafPreimage>> {
        Ok(self.indexed(id, "get_leaf_preimage")?.get_leaf_preimage(index)?)
    }

    /// Indices holding `value` (a leaf value, or a key for indexed trees).
    pub fn find_leaf_indices(&self, id: MerkleTreeId, value: &Fr) -> Vec<u64> {
        match self.tree(id) {
            TreeRef::Append(tree) => tree.find_leaf_indices(value),
            TreeRef::Indexed(tree) => tree.find_leaf_index(value).into_iter().collect(),
        }
    }

    pub fn find_low_leaf(&self, id: MerkleTreeId, key: &Fr) -> WorldStateResult<LowLeafLookup> {
        Ok(self.indexed(id, "find_low_leaf")?.find_low_leaf(key)?)
    }

    pub fn append_leaves(&mut self, id: MerkleTreeId, leaves: &[Fr]) -> WorldStateResult<()> {
        self.append_only_mut(id, "append_leaves")?.append(leaves)?;
        Ok(())
    }

    pub fn batch_insert(
        &mut self,
        id: MerkleTreeId,
        leaves: &[IndexedLeaf],
        subtree_height: u8,
    ) -> WorldStateResult<BatchInsertionResult> {
        Ok(self
            .indexed_mut(id, "batch_insert")?
            .batch_insert(leaves, subtree_height)?)
    }

    pub fn sequential_insert(
        &mut self,
        id: MerkleTreeId,
        leaves: &[IndexedLeaf],
    ) -> WorldStateResult<SequentialInsertionResult> {
        Ok(self
            .indexed_mut(id, "sequential_insert")?
            .insert_sequential(leaves)?)
    }

    pub fn archive(&self) -> &AppendOnlyTree<H> {
        &self.archive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollshrew_trees::Sha256Hasher;

    fn small_config() -> WorldStateConfig {
        WorldStateConfig {
            note_hash_tree_depth: 8,
            nullifier_tree_depth: 8,
            public_data_tree_depth: 8,
            l1_to_l2_message_tree_depth: 8,
            archive_tree_depth: 8,
            initial_nullifier_tree_size: 4,
            initial_public_data_tree_size: 4,
            nullifier_subtree_height: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_operations_are_routed_by_tree_kind() {
        let mut trees = TreeSet::empty(&small_config(), &Sha256Hasher).unwrap();

        trees
            .append_leaves(MerkleTreeId::NoteHashTree, &[Fr::from(7)])
            .unwrap();
        assert_eq!(trees.get_tree_info(MerkleTreeId::NoteHashTree).size, 1);
        assert_eq!(
            trees.find_leaf_indices(MerkleTreeId::NoteHashTree, &Fr::from(7)),
            vec![0]
        );

        let err = trees
            .append_leaves(MerkleTreeId::NullifierTree, &[Fr::from(9)])
            .unwrap_err();
        assert!(matches!(
            err,
            WorldStateError::UnsupportedOperation {
                tree: MerkleTreeId::NullifierTree,
                operation: "append_leaves"
            }
        ));
        assert!(trees
            .find_low_leaf(MerkleTreeId::Archive, &Fr::from(1))
            .is_err());

        trees
            .batch_insert(MerkleTreeId::NullifierTree, &[IndexedLeaf::nullifier(Fr::from(9))], 1)
            .unwrap();
        assert_eq!(
            trees.find_leaf_indices(MerkleTreeId::NullifierTree, &Fr::from(9)),
            vec![4]
        );
        let low = trees
            .find_low_leaf(MerkleTreeId::NullifierTree, &Fr::from(10))
            .unwrap();
        assert_eq!(low.index, 4);
        assert!(!low.already_present);
    }

    #[test]
    fn test_open_does_not_touch_snapshot() {
        let trees = TreeSet::empty(&small_config(), &Sha256Hasher).unwrap();
        let snapshot = trees.freeze(0, 0, 4);
        let before = snapshot.meta(MerkleTreeId::NoteHashTree);

        let mut view = TreeSet::open(&snapshot, &Sha256Hasher);
        view.append_leaves(MerkleTreeId::NoteHashTree, &[Fr::from(1), Fr::from(2)])
            .unwrap();

        assert_eq!(snapshot.meta(MerkleTreeId::NoteHashTree), before);
        assert_eq!(view.get_tree_info(MerkleTreeId::NoteHashTree).size, 2);
    }
}

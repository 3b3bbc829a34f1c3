//! Persisting tree layers into a key-value store

use crate::append_only::AppendOnlyTree;
use crate::error::{TreeError, TreeResult};
use crate::hasher::Hasher;
use crate::key_utils::{
    decode_indices, encode_indices, make_index_key, make_leaf_key, make_leaf_prefix, make_meta_key,
    make_tree_prefix, parse_leaf_index,
};
use crate::layer::TreeLayer;
use crate::leaf::TreeLeaf;
use crate::traits::{BatchLike, KeyValueStoreLike};
use crate::types::{MerkleTreeId, TreeMeta};
use log::{debug, info};
use rollshrew_support::Fr;

fn storage_error<E: std::fmt::Debug>(err: E) -> TreeError {
    TreeError::Storage(format!("{:?}", err))
}

/// Stage the writes made in `layer` itself (not its parents) plus its meta.
pub fn stage_layer<L: TreeLeaf, B: BatchLike>(layer: &TreeLayer<L>, batch: &mut B) {
    let id = layer.meta().id;
    for (index, leaf) in layer.own_leaves() {
        batch.put(make_leaf_key(id, *index), leaf.to_bytes());
    }
    for key in layer.own_index_keys() {
        batch.put(make_index_key(id, key), encode_indices(&layer.indices_of(key)));
    }
    batch.put(make_meta_key(id), layer.meta().to_bytes());
}

/// Stage a full rewrite of one tree: drop everything stored for it, then
/// write the flattened state of `layer`.
pub fn stage_full_rewrite<L: TreeLeaf, S: KeyValueStoreLike>(
    store: &S,
    layer: &TreeLayer<L>,
    batch: &mut S::Batch,
) -> TreeResult<()> {
    let id = layer.meta().id;
    let existing = store
        .scan_prefix(make_tree_prefix(id))
        .map_err(storage_error)?;
    debug!("{}: rewriting, dropping {} stored keys", id, existing.len());
    for (key, _) in existing {
        batch.delete(key);
    }
    stage_layer(&layer.flatten(), batch);
    Ok(())
}

pub fn load_meta<S: KeyValueStoreLike>(store: &S, id: MerkleTreeId) -> TreeResult<Option<TreeMeta>> {
    store
        .get_immutable(make_meta_key(id))
        .map_err(storage_error)?
        .map(|bytes| TreeMeta::from_bytes(&bytes))
        .transpose()
}

/// Rebuild a tree from its stored leaves, checking the stored root.
pub fn load_tree<L: TreeLeaf, H: Hasher, S: KeyValueStoreLike>(
    store: &S,
    id: MerkleTreeId,
    hasher: H,
) -> TreeResult<Option<AppendOnlyTree<H, L>>> {
    let Some(meta) = load_meta(store, id)? else {
        return Ok(None);
    };
    if meta.id != id {
        return Err(TreeError::InvalidState(format!(
            "meta stored under {} belongs to {}",
            id, meta.id
        )));
    }
    let mut leaves = Vec::new();
    for (key, value) in store
        .scan_prefix(make_leaf_prefix(id))
        .map_err(storage_error)?
    {
        let index = parse_leaf_index(id, &key)
            .ok_or_else(|| TreeError::Serialization(format!("malformed leaf key {}", hex::encode(&key))))?;
        leaves.push((index, L::from_bytes(&value)?));
    }
    info!("{}: loaded {} leaves, size {}", id, leaves.len(), meta.size);
    AppendOnlyTree::from_leaves(meta, leaves, hasher).map(Some)
}

/// Leaf indices recorded for `key` in the persisted index.
pub fn find_persisted_leaf_indices<S: KeyValueStoreLike>(
    store: &S,
    id: MerkleTreeId,
    key: &Fr,
) -> TreeResult<Vec<u64>> {
    Ok(store
        .get_immutable(make_index_key(id, key))
        .map_err(storage_error)?
        .map(|bytes| decode_indices(&bytes))
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Sha256Hasher;
    use crate::indexed::IndexedTree;
    use crate::leaf::{IndexedLeaf, IndexedLeafPreimage};
    use crate::mem_store::MemStore;
    use crate::types::DuplicateKeyPolicy;

    #[test]
    fn test_layers_persist_incrementally() {
        let mut store = MemStore::new();
        let mut tree = AppendOnlyTree::<Sha256Hasher>::new(MerkleTreeId::NoteHashTree, 8, Sha256Hasher).unwrap();
        tree.append(&[Fr::from(1), Fr::from(2)]).unwrap();
        let mut batch = store.create_batch();
        stage_layer(tree.layer(), &mut batch);
        store.write(batch).unwrap();
        let committed = tree.commit(4);

        let mut next = AppendOnlyTree::from_committed(committed, Sha256Hasher);
        next.append(&[Fr::from(2)]).unwrap();
        let mut batch = store.create_batch();
        stage_layer(next.layer(), &mut batch);
        store.write(batch).unwrap();

        let loaded: AppendOnlyTree<Sha256Hasher> =
            load_tree(&store, MerkleTreeId::NoteHashTree, Sha256Hasher).unwrap().unwrap();
        assert_eq!(loaded.root(), next.root());
        assert_eq!(loaded.size(), 3);
        assert_eq!(
            find_persisted_leaf_indices(&store, MerkleTreeId::NoteHashTree, &Fr::from(2)).unwrap(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_full_rewrite_drops_leaves_past_size() {
        let mut store = MemStore::new();
        let mut tree = IndexedTree::new(
            MerkleTreeId::NullifierTree,
            6,
            1,
            DuplicateKeyPolicy::Reject,
            Sha256Hasher,
        )
        .unwrap();
        let mut batch = store.create_batch();
        stage_layer(tree.inner().layer(), &mut batch);
        store.write(batch).unwrap();
        let snapshot_root = tree.root();
        let base = tree.commit(4);

        let mut grown = IndexedTree::from_committed(base.clone(), DuplicateKeyPolicy::Reject, Sha256Hasher);
        grown.insert_sequential(&[IndexedLeaf::nullifier(Fr::from(5))]).unwrap();
        let mut batch = store.create_batch();
        stage_layer(grown.inner().layer(), &mut batch);
        store.write(batch).unwrap();

        let mut batch = store.create_batch();
        stage_full_rewrite(&store, &base, &mut batch).unwrap();
        store.write(batch).unwrap();

        let loaded: AppendOnlyTree<Sha256Hasher, IndexedLeafPreimage> =
            load_tree(&store, MerkleTreeId::NullifierTree, Sha256Hasher).unwrap().unwrap();
        assert_eq!(loaded.root(), snapshot_root);
        assert_eq!(loaded.size(), 1);
    }

    #[test]
    fn test_missing_tree_loads_as_none() {
        let store = MemStore::new();
        let loaded: Option<AppendOnlyTree<Sha256Hasher>> =
            load_tree(&store, MerkleTreeId::Archive, Sha256Hasher).unwrap();
        assert!(loaded.is_none());
    }
}

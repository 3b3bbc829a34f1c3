//! Indexed tree witnesses checked through committed world state

use super::{TestConfig, TestUtils};
use anyhow::Result;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rollshrew_support::Fr;
use rollshrew_trees::{IndexedLeaf, MerkleTreeId, Sha256Hasher, TreeLeaf};
use rollshrew_world_state::{TreeSet, WorldState, WorldStateError};
use std::collections::BTreeSet;

const NULLIFIERS: MerkleTreeId = MerkleTreeId::NullifierTree;

/// Keys reached by following `next_index` pointers from leaf 0.
fn walk(trees: &TreeSet<Sha256Hasher>) -> Result<Vec<Fr>> {
    let mut keys = Vec::new();
    let mut index = 0;
    loop {
        let preimage = trees
            .get_leaf_preimage(NULLIFIERS, index)?
            .ok_or_else(|| anyhow::anyhow!("broken link at {}", index))?;
        keys.push(preimage.key());
        if preimage.is_max() {
            return Ok(keys);
        }
        index = preimage.next_index;
    }
}

fn assert_member(trees: &TreeSet<Sha256Hasher>, key: &Fr) -> Result<()> {
    let indices = trees.find_leaf_indices(NULLIFIERS, key);
    assert_eq!(indices.len(), 1, "{} not indexed", key);
    let preimage = trees
        .get_leaf_preimage(NULLIFIERS, indices[0])?
        .ok_or_else(|| anyhow::anyhow!("no leaf at {}", indices[0]))?;
    let path = trees.get_sibling_path(NULLIFIERS, indices[0])?;
    assert_eq!(
        path.compute_root(preimage.leaf_hash(&Sha256Hasher), indices[0], &Sha256Hasher),
        trees.get_tree_info(NULLIFIERS).root
    );
    Ok(())
}

#[test]
fn test_random_batches_keep_sorted_provable_leaves() -> Result<()> {
    TestUtils::init_logging();
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let world = WorldState::new(TestConfig::world_state(), Sha256Hasher)?;
    let mut inserted: BTreeSet<Fr> = (0..TestConfig::world_state().initial_nullifier_tree_size)
        .map(Fr::from)
        .collect();

    for _ in 0..6 {
        let mut batch: Vec<Fr> = Vec::new();
        while batch.len() < 16 {
            let key = Fr::from(rng.gen_range(1_000u64..1_000_000));
            if !inserted.contains(&key) && !batch.contains(&key) {
                batch.push(key);
            }
        }
        batch.shuffle(&mut rng);

        let mut fork = world.fork(None)?;
        let before = fork.get_tree_info(NULLIFIERS).root;
        let leaves: Vec<IndexedLeaf> = batch.iter().map(|k| IndexedLeaf::nullifier(*k)).collect();
        let result = fork.batch_insert(NULLIFIERS, &leaves, 4)?;

        // The first low-leaf witness is taken against the pre-batch tree.
        let first = &result.low_leaves_witness_data[0];
        assert_eq!(
            first
                .sibling_path
                .compute_root(first.preimage.leaf_hash(&Sha256Hasher), first.index, &Sha256Hasher),
            before
        );
        let mut permutation = result.sorted_new_leaves_indexes.clone();
        permutation.sort_unstable();
        assert_eq!(permutation, (0..16).collect::<Vec<u32>>());

        world.commit(fork)?;
        inserted.extend(batch.iter().copied());

        let committed = world.committed()?;
        assert_eq!(walk(&committed)?, inserted.iter().copied().collect::<Vec<_>>());
        for key in &batch {
            assert_member(&committed, key)?;
        }
    }
    Ok(())
}

#[test]
fn test_duplicate_in_batch_leaves_fork_unchanged() -> Result<()> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(9);
    let world = WorldState::new(TestConfig::world_state(), Sha256Hasher)?;
    let mut fork = world.fork(None)?;
    let mut keys = BTreeSet::new();
    while keys.len() < 8 {
        keys.insert(rng.gen_range(1_000u64..2_000));
    }
    let existing: Vec<IndexedLeaf> = keys
        .into_iter()
        .map(|k| IndexedLeaf::nullifier(Fr::from(k)))
        .collect();
    fork.batch_insert(NULLIFIERS, &existing, 3)?;
    let root = fork.get_tree_info(NULLIFIERS);

    let mut replay = vec![IndexedLeaf::nullifier(Fr::from(999_999)), existing[0]];
    replay.shuffle(&mut rng);
    let err = fork.batch_insert(NULLIFIERS, &replay, 1).unwrap_err();
    assert!(matches!(err, WorldStateError::Tree(_)));
    assert_eq!(fork.get_tree_info(NULLIFIERS), root);
    assert!(fork.find_leaf_indices(NULLIFIERS, &Fr::from(999_999)).is_empty());
    Ok(())
}

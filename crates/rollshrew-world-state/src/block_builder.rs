//! Applying transaction effects and building block headers on a fork

use crate::error::WorldStateResult;
use crate::tree_set::TreeSet;
use crate::world_state::WorldStateFork;
use log::debug;
use rollshrew_support::{BlockHeader, Fr, Tx, TxEffect, TxHash};
use rollshrew_trees::{Hasher, IndexedLeaf, MerkleTreeId};

/// Header and resulting archive root of a block built on a fork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltBlock {
    pub header: BlockHeader,
    pub archive_root: Fr,
}

impl<H: Hasher> TreeSet<H> {
    /// Header committing to the current roots, with the archive root taken
    /// before the header itself is appended.
    pub fn state_header(&self, number: u32, slot_number: u64, tx_hashes: &[TxHash]) -> BlockHeader {
        BlockHeader {
            number,
            slot_number,
            last_archive_root: self.get_tree_info(MerkleTreeId::Archive).root,
            note_hash_root: self.get_tree_info(MerkleTreeId::NoteHashTree).root,
            nullifier_root: self.get_tree_info(MerkleTreeId::NullifierTree).root,
            public_data_root: self.get_tree_info(MerkleTreeId::PublicDataTree).root,
            l1_to_l2_message_root: self.get_tree_info(MerkleTreeId::L1ToL2MessageTree).root,
            tx_hashes_commitment: BlockHeader::commit_tx_hashes(tx_hashes),
        }
    }

    /// Hash of block `number` as recorded in the archive.
    pub fn block_hash(&self, number: u32) -> WorldStateResult<Option<Fr>> {
        if u64::from(number) >= self.archive().size() {
            return Ok(None);
        }
        self.get_leaf_value(MerkleTreeId::Archive, u64::from(number))
    }
}

impl<H: Hasher> WorldStateFork<H> {
    /// Apply one transaction's side effects: note hashes are appended,
    /// nullifiers batch-inserted as one subtree and public data writes
    /// upserted in order.
    pub fn apply_tx_effects(&mut self, effect: &TxEffect) -> WorldStateResult<()> {
        let subtree_height = self.nullifier_subtree_height;
        self.append_leaves(MerkleTreeId::NoteHashTree, &effect.note_hashes)?;

        if !effect.nullifiers.is_empty() {
            let nullifiers: Vec<IndexedLeaf> = effect
                .nullifiers
                .iter()
                .map(|nullifier| IndexedLeaf::nullifier(*nullifier))
                .collect();
            self.batch_insert(MerkleTreeId::NullifierTree, &nullifiers, subtree_height)?;
        }

        if !effect.public_data_writes.is_empty() {
            let writes: Vec<IndexedLeaf> = effect
                .public_data_writes
                .iter()
                .map(|write| IndexedLeaf::new(write.slot, write.value))
                .collect();
            self.sequential_insert(MerkleTreeId::PublicDataTree, &writes)?;
        }
        Ok(())
    }

    /// Apply `txs` and `l1_to_l2_messages` as the block following the fork's
    /// base, then append the block header to the archive.
    pub fn build_block(
        &mut self,
        slot_number: u64,
        txs: &[Tx],
        l1_to_l2_messages: &[Fr],
    ) -> WorldStateResult<BuiltBlock> {
        let number = self.base_block() + 1;
        for tx in txs {
            self.apply_tx_effects(&tx.effect)?;
        }
        self.append_leaves(MerkleTreeId::L1ToL2MessageTree, l1_to_l2_messages)?;

        let tx_hashes: Vec<TxHash> = txs.iter().map(Tx::hash).collect();
        let header = self.state_header(number, slot_number, &tx_hashes);
        self.append_leaves(MerkleTreeId::Archive, &[header.hash()])?;
        let archive_root = self.get_tree_info(MerkleTreeId::Archive).root;
        debug!(
            "Built block {} with {} txs, archive root {}",
            number,
            txs.len(),
            archive_root
        );
        Ok(BuiltBlock {
            header,
            archive_root,
        })
    }
}

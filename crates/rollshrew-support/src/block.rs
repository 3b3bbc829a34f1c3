//! Blocks, block headers, chain tips and proposals

use crate::fr::Fr;
use crate::hash::sha256_fr;
use crate::tx::{Tx, TxHash};
use serde::{Deserialize, Serialize};

/// A block number together with the hash of the block at that height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct L2BlockId {
    pub number: u32,
    pub hash: Fr,
}

impl L2BlockId {
    pub fn new(number: u32, hash: Fr) -> Self {
        Self { number, hash }
    }
}

/// The latest, proven and finalized chain pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct L2Tips {
    pub latest: L2BlockId,
    pub proven: L2BlockId,
    pub finalized: L2BlockId,
}

/// Block header committing to the state roots after the block was applied.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u32,
    pub slot_number: u64,
    /// Archive root before this block's hash was appended.
    pub last_archive_root: Fr,
    pub note_hash_root: Fr,
    pub nullifier_root: Fr,
    pub public_data_root: Fr,
    pub l1_to_l2_message_root: Fr,
    /// Hash over the ordered tx hashes of the block.
    pub tx_hashes_commitment: Fr,
}

impl BlockHeader {
    pub fn hash(&self) -> Fr {
        sha256_fr(&[
            b"header",
            &self.number.to_be_bytes(),
            &self.slot_number.to_be_bytes(),
            self.last_archive_root.as_bytes(),
            self.note_hash_root.as_bytes(),
            self.nullifier_root.as_bytes(),
            self.public_data_root.as_bytes(),
            self.l1_to_l2_message_root.as_bytes(),
            self.tx_hashes_commitment.as_bytes(),
        ])
    }

    pub fn commit_tx_hashes(tx_hashes: &[TxHash]) -> Fr {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(tx_hashes.len() + 1);
        parts.push(b"txs");
        for tx_hash in tx_hashes {
            parts.push(tx_hash.0.as_bytes());
        }
        sha256_fr(&parts)
    }
}

/// A published block with its transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2Block {
    pub header: BlockHeader,
    /// Archive root after this block's hash was appended.
    pub archive_root: Fr,
    pub txs: Vec<Tx>,
    pub l1_to_l2_messages: Vec<Fr>,
}

impl L2Block {
    pub fn number(&self) -> u32 {
        self.header.number
    }

    pub fn hash(&self) -> Fr {
        self.header.hash()
    }

    pub fn id(&self) -> L2BlockId {
        L2BlockId::new(self.number(), self.hash())
    }

    pub fn tx_hashes(&self) -> Vec<TxHash> {
        self.txs.iter().map(Tx::hash).collect()
    }
}

/// A proposed block as gossiped by the slot's proposer.
///
/// Validators receive only the tx hashes and have to hydrate the transactions
/// themselves before they can re-execute the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockProposal {
    pub block_number: u32,
    pub slot_number: u64,
    pub header: BlockHeader,
    pub archive_root: Fr,
    pub tx_hashes: Vec<TxHash>,
    pub l1_to_l2_messages: Vec<Fr>,
}

impl BlockProposal {
    pub fn from_block(block: &L2Block) -> Self {
        Self {
            block_number: block.number(),
            slot_number: block.header.slot_number,
            header: block.header.clone(),
            archive_root: block.archive_root,
            tx_hashes: block.tx_hashes(),
            l1_to_l2_messages: block.l1_to_l2_messages.clone(),
        }
    }
}

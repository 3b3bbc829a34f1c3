//! Transactions and their state side effects

use crate::fr::Fr;
use crate::hash::sha256_fr;
use crate::utils::{
    consume_exact, consume_fr, consume_fr_list, consume_u32, remaining_slice, write_fr_list,
};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

/// Content hash identifying a transaction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TxHash(pub Fr);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.0.to_hex())
    }
}

/// A write to a public storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicDataWrite {
    pub slot: Fr,
    pub value: Fr,
}

/// The state changes a transaction applies once included in a block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEffect {
    pub note_hashes: Vec<Fr>,
    pub nullifiers: Vec<Fr>,
    pub public_data_writes: Vec<PublicDataWrite>,
}

impl TxEffect {
    pub fn encode(&self, out: &mut Vec<u8>) {
        write_fr_list(out, &self.note_hashes);
        write_fr_list(out, &self.nullifiers);
        out.extend_from_slice(&(self.public_data_writes.len() as u32).to_be_bytes());
        for write in &self.public_data_writes {
            out.extend_from_slice(write.slot.as_bytes());
            out.extend_from_slice(write.value.as_bytes());
        }
    }

    pub fn decode(cursor: &mut Cursor<Vec<u8>>) -> Result<Self> {
        let note_hashes = consume_fr_list(cursor)?;
        let nullifiers = consume_fr_list(cursor)?;
        let count = consume_u32(cursor)? as usize;
        let mut public_data_writes = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            public_data_writes.push(PublicDataWrite {
                slot: consume_fr(cursor)?,
                value: consume_fr(cursor)?,
            });
        }
        Ok(Self {
            note_hashes,
            nullifiers,
            public_data_writes,
        })
    }
}

/// A transaction as gossiped and fetched between peers.
///
/// The hash is derived from the content, so a peer cannot hand back a
/// transaction under a hash it does not match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub effect: TxEffect,
    /// Opaque client proof bytes.
    pub proof: Vec<u8>,
}

impl Tx {
    pub fn new(effect: TxEffect, proof: Vec<u8>) -> Self {
        Self { effect, proof }
    }

    pub fn hash(&self) -> TxHash {
        TxHash(sha256_fr(&[b"tx", &self.to_bytes()]))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.effect.encode(&mut out);
        out.extend_from_slice(&(self.proof.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.proof);
        out
    }

    pub fn decode(cursor: &mut Cursor<Vec<u8>>) -> Result<Self> {
        let effect = TxEffect::decode(cursor)?;
        let len = consume_u32(cursor)? as usize;
        if len > remaining_slice(cursor).len() {
            return Err(anyhow!("proof length {} exceeds remaining input", len));
        }
        let proof = consume_exact(cursor, len)?;
        Ok(Self { effect, proof })
    }
}
